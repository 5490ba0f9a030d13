//! Core message types for the hub
//!
//! Everything that travels over the bus is a [`Message`]: an action
//! [`Request`], the [`Response`] it produced, or an asynchronous [`Event`].
//! All three share one flat JSON wire format discriminated by a `type` key.

mod error;
mod event;
mod id;
mod message;
mod request;
mod response;

pub use error::{MessageError, MessageResult};
pub use event::{Event, EventType};
pub use id::new_message_id;
pub use message::Message;
pub use request::{Request, RequestBuilder};
pub use response::Response;

/// Ordered key→value map used for request and event arguments
pub type Args = indexmap::IndexMap<String, serde_json::Value>;

/// Well-known event type tags
///
/// Each tag is `<namespace>.<SubtypeName>`. The ancestry of every tag listed
/// here is declared in the event catalog, which drives polymorphic condition
/// matching.
pub mod event_types {
    /// Root of every event hierarchy
    pub const EVENT: &str = "hub.event.Event";

    /// Liveness probe
    pub const PING: &str = "hub.event.ping.PingEvent";

    /// User-defined event with a free-form `subtype` attribute
    pub const CUSTOM: &str = "hub.event.custom.CustomEvent";

    /// Base of all application lifecycle events
    pub const APPLICATION: &str = "hub.event.application.ApplicationEvent";

    /// Fired once the dispatch loop is up
    pub const APPLICATION_STARTED: &str = "hub.event.application.ApplicationStartedEvent";

    /// Asks the dispatch loop identified by `thread_id` to exit
    pub const STOP: &str = "hub.event.application.StopEvent";

    /// Base of voice assistant events
    pub const ASSISTANT: &str = "hub.event.assistant.AssistantEvent";

    /// A phrase recognized by a voice assistant (`phrase` attribute)
    pub const SPEECH_RECOGNIZED: &str = "hub.event.assistant.SpeechRecognizedEvent";

    /// Base of sensor events
    pub const SENSOR: &str = "hub.event.sensor.SensorEvent";

    /// New sensor reading (`data` attribute)
    pub const SENSOR_DATA_CHANGE: &str = "hub.event.sensor.SensorDataChangeEvent";

    /// Emitted when a cronjob finishes
    pub const CRONJOB: &str = "hub.event.cron.CronjobEvent";
}
