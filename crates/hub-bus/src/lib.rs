//! Message bus for the hub
//!
//! A [`Bus`] moves encoded [`Message`]s between producers and a dispatch
//! loop. `post` enqueues without blocking, `poll` feeds every decoded
//! message to a [`MessageHandler`] until a stop event addressed to the
//! polling loop arrives, and `stop` posts that event.
//!
//! Two implementations are provided:
//!
//! - [`LocalBus`]: in-process broadcast channel
//! - [`MqttBus`]: MQTT broker, one topic per device

mod error;
mod local;
mod mqtt;

use async_trait::async_trait;
use hub_core::{Event, Message};
use tracing::{debug, info, warn};

pub use error::{BusError, BusResult};
pub use local::LocalBus;
pub use mqtt::{MqttBus, MqttConfig};

/// Identity of a dispatch loop, used to address stop events
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoopId(String);

impl LoopId {
    /// Generate a new unique loop id
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LoopId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for LoopId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for LoopId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Consumer of messages pulled off the bus
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, msg: Message);
}

/// Ordered message channel shared by producers and dispatch loops
#[async_trait]
pub trait Bus: Send + Sync {
    /// Identifier of the local node
    fn device_id(&self) -> &str;

    /// Enqueue a message without waiting for delivery
    ///
    /// Empty origin/target fields are stamped with the local device id.
    fn post(&self, msg: Message) -> BusResult<()>;

    /// Feed messages to `handler` until a stop event for `loop_id` arrives
    ///
    /// The stop event itself is handed to `handler` before returning.
    async fn poll(&self, loop_id: &LoopId, handler: &dyn MessageHandler) -> BusResult<()>;

    /// Ask the dispatch loop `loop_id` to exit
    fn stop(&self, loop_id: &LoopId) -> BusResult<()> {
        info!(loop_id = %loop_id, "Requesting dispatch loop stop");
        let event = Event::stop(loop_id.as_str())
            .with_origin(self.device_id())
            .with_target(self.device_id());
        self.post(event.into())
    }
}

/// Decode one payload and hand it to `handler`
///
/// Returns `true` when the message was the stop event for `loop_id`.
/// Undecodable payloads are dropped with a warning.
pub(crate) async fn dispatch_payload(
    payload: &[u8],
    device_id: &str,
    loop_id: &LoopId,
    handler: &dyn MessageHandler,
) -> bool {
    let msg = match Message::decode(payload) {
        Ok(msg) => msg.with_default_target(device_id),
        Err(err) => {
            warn!(error = %err, size = payload.len(), "Dropping undecodable message");
            return false;
        }
    };

    let is_stop = matches!(
        &msg,
        Message::Event(event) if event.stop_thread_id() == Some(loop_id.as_str())
    );

    debug!(kind = msg.kind(), "Received message");
    handler.handle(msg).await;

    if is_stop {
        info!(loop_id = %loop_id, "Dispatch loop stopped");
    }
    is_stop
}
