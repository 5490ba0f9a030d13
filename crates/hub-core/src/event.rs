//! Event types and the event type catalog

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event_types as types;
use crate::id::{new_message_id, null_as_empty};
use crate::{Args, MessageError};

/// Declared position of a known event type in the hierarchy
struct EventKind {
    tag: &'static str,
    /// Every tag this kind satisfies besides itself, nearest first
    ancestors: &'static [&'static str],
    notify_web_clients: bool,
}

const CATALOG: &[EventKind] = &[
    EventKind {
        tag: types::EVENT,
        ancestors: &[],
        notify_web_clients: true,
    },
    EventKind {
        tag: types::PING,
        ancestors: &[types::EVENT],
        notify_web_clients: true,
    },
    EventKind {
        tag: types::CUSTOM,
        ancestors: &[types::EVENT],
        notify_web_clients: true,
    },
    EventKind {
        tag: types::APPLICATION,
        ancestors: &[types::EVENT],
        notify_web_clients: true,
    },
    EventKind {
        tag: types::APPLICATION_STARTED,
        ancestors: &[types::APPLICATION, types::EVENT],
        notify_web_clients: true,
    },
    EventKind {
        tag: types::STOP,
        ancestors: &[types::APPLICATION, types::EVENT],
        notify_web_clients: false,
    },
    EventKind {
        tag: types::ASSISTANT,
        ancestors: &[types::EVENT],
        notify_web_clients: true,
    },
    EventKind {
        tag: types::SPEECH_RECOGNIZED,
        ancestors: &[types::ASSISTANT, types::EVENT],
        notify_web_clients: true,
    },
    EventKind {
        tag: types::SENSOR,
        ancestors: &[types::EVENT],
        notify_web_clients: true,
    },
    EventKind {
        tag: types::SENSOR_DATA_CHANGE,
        ancestors: &[types::SENSOR, types::EVENT],
        notify_web_clients: true,
    },
    EventKind {
        tag: types::CRONJOB,
        ancestors: &[types::EVENT],
        notify_web_clients: true,
    },
];

const ROOT_ONLY: &[&str] = &[types::EVENT];

/// Event type tag, e.g. `hub.event.ping.PingEvent`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    /// Create an event type from its full tag
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Get the full tag
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last dotted segment of the tag, e.g. `PingEvent`
    pub fn short_name(&self) -> &str {
        short_name(&self.0)
    }

    fn kind(&self) -> Option<&'static EventKind> {
        CATALOG.iter().find(|kind| kind.tag == self.0)
    }

    /// Declared ancestors of this type; unknown types only descend from the root
    pub fn ancestors(&self) -> &'static [&'static str] {
        self.kind().map_or(ROOT_ONLY, |kind| kind.ancestors)
    }

    /// Polymorphic "is-a" check
    ///
    /// `wanted` may be a full tag or a short name; it matches this type or
    /// any of its declared ancestors.
    pub fn is_a(&self, wanted: &str) -> bool {
        let matches = |tag: &str| tag == wanted || short_name(tag) == wanted;
        matches(&self.0) || self.ancestors().iter().any(|tag| matches(tag))
    }

    /// Whether events of this type are forwarded to web clients
    pub fn notifies_web_clients(&self) -> bool {
        self.kind().map_or(true, |kind| kind.notify_web_clients)
    }
}

fn short_name(tag: &str) -> &str {
    tag.rsplit('.').next().unwrap_or(tag)
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An asynchronous notification that something happened
///
/// On the wire the type tag lives inside `args` under the `type` key; in
/// memory it is kept apart from the attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventWire", into = "EventWire")]
pub struct Event {
    id: String,
    target: String,
    origin: String,
    event_type: EventType,
    args: Args,
}

impl Event {
    /// Create an event with a fresh id and no origin/target yet
    pub fn new(event_type: impl Into<EventType>, args: Args) -> Self {
        Self {
            id: new_message_id(),
            target: String::new(),
            origin: String::new(),
            event_type: event_type.into(),
            args,
        }
    }

    /// Create a ping event carrying `message`
    pub fn ping(message: impl Into<String>) -> Self {
        let mut args = Args::new();
        args.insert("message".to_string(), Value::String(message.into()));
        Self::new(types::PING, args)
    }

    /// Create a custom event of the given free-form subtype
    pub fn custom(subtype: impl Into<String>, mut args: Args) -> Self {
        args.insert("subtype".to_string(), Value::String(subtype.into()));
        Self::new(types::CUSTOM, args)
    }

    /// Create a stop event addressed to the dispatch loop `thread_id`
    pub fn stop(thread_id: impl Into<String>) -> Self {
        let mut args = Args::new();
        args.insert("thread_id".to_string(), Value::String(thread_id.into()));
        Self::new(types::STOP, args)
    }

    /// Set the target node
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Set the origin node
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Message id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Target node id
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Origin node id
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Event type tag
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// Subtype attributes (without the type tag)
    pub fn args(&self) -> &Args {
        &self.args
    }

    /// Look up a single attribute
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }

    /// If this is a stop event, the dispatch loop it is addressed to
    pub fn stop_thread_id(&self) -> Option<&str> {
        if self.event_type.as_str() != types::STOP {
            return None;
        }
        self.args.get("thread_id").and_then(Value::as_str)
    }

    /// Wire representation of the event as a JSON object
    pub fn to_value(&self) -> Value {
        serde_json::to_value(EventWire::from(self.clone())).unwrap_or(Value::Null)
    }
}

/// Flat wire shape of an event
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventWire {
    #[serde(default = "new_message_id")]
    id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    target: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    origin: String,
    args: Args,
}

impl TryFrom<EventWire> for Event {
    type Error = MessageError;

    fn try_from(mut wire: EventWire) -> Result<Self, Self::Error> {
        let event_type = match wire.args.shift_remove("type") {
            Some(Value::String(tag)) => EventType::new(tag),
            _ => return Err(MessageError::MissingEventType),
        };

        Ok(Self {
            id: wire.id,
            target: wire.target,
            origin: wire.origin,
            event_type,
            args: wire.args,
        })
    }
}

impl From<Event> for EventWire {
    fn from(event: Event) -> Self {
        let mut args = Args::with_capacity(event.args.len() + 1);
        args.insert("type".to_string(), Value::String(event.event_type.0));
        args.extend(event.args);

        Self {
            id: event.id,
            target: event.target,
            origin: event.origin,
            args,
        }
    }
}
