//! In-process bus

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hub_core::Message;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::{dispatch_payload, Bus, BusError, BusResult, LoopId, MessageHandler};

/// Default channel capacity
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

type Payload = Arc<Vec<u8>>;

/// Bus backed by a tokio broadcast channel of encoded messages
///
/// Messages go through the same encode/decode path as on the network, so
/// handlers see exactly what a remote node would. Every active poll loop
/// receives every message.
pub struct LocalBus {
    device_id: String,
    sender: broadcast::Sender<Payload>,
    /// Receiver created with the bus so the first poll sees messages posted
    /// before it started
    first_receiver: Mutex<Option<broadcast::Receiver<Payload>>>,
}

impl LocalBus {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self::with_capacity(device_id, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(device_id: impl Into<String>, capacity: usize) -> Self {
        let (sender, receiver) = broadcast::channel(capacity.max(1));
        Self {
            device_id: device_id.into(),
            sender,
            first_receiver: Mutex::new(Some(receiver)),
        }
    }

    fn receiver(&self) -> broadcast::Receiver<Payload> {
        let first = match self.first_receiver.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        first.unwrap_or_else(|| self.sender.subscribe())
    }
}

#[async_trait]
impl Bus for LocalBus {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn post(&self, msg: Message) -> BusResult<()> {
        let payload = msg.with_defaults(&self.device_id).encode()?;
        // An error only means no loop is polling right now
        if self.sender.send(Arc::new(payload)).is_err() {
            trace!("No active poll loop, message dropped");
        }
        Ok(())
    }

    async fn poll(&self, loop_id: &LoopId, handler: &dyn MessageHandler) -> BusResult<()> {
        let mut rx = self.receiver();
        loop {
            match rx.recv().await {
                Ok(payload) => {
                    if dispatch_payload(&payload, &self.device_id, loop_id, handler).await {
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(loop_id = %loop_id, skipped, "Poll loop lagged, messages skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(BusError::Closed),
            }
        }
    }
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBus")
            .field("device_id", &self.device_id)
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}
