//! The message envelope and its JSON codec

use serde::{Deserialize, Serialize};

use crate::{Event, MessageError, MessageResult, Request, Response};

/// Anything that can travel over the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Request(Request),
    Response(Response),
    Event(Event),
}

impl Message {
    /// Encode to a UTF-8 JSON payload
    pub fn encode(&self) -> MessageResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|source| MessageError::Encode { source })
    }

    /// Decode a UTF-8 JSON payload
    pub fn decode(payload: &[u8]) -> MessageResult<Self> {
        serde_json::from_slice(payload).map_err(|source| MessageError::Malformed { source })
    }

    /// Wire discriminator of this message
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Response(_) => "response",
            Self::Event(_) => "event",
        }
    }

    /// Node the message is addressed to, if it carries one
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Request(req) => Some(req.target()),
            Self::Event(event) => Some(event.target()),
            Self::Response(resp) => resp.target.as_deref(),
        }
    }

    /// Stamp empty origin/target fields with the local device id
    pub fn with_defaults(self, device_id: &str) -> Self {
        match self {
            Self::Request(req) => Self::Request(req.with_defaults(device_id)),
            Self::Event(event) => {
                let event = if event.origin().is_empty() {
                    event.with_origin(device_id)
                } else {
                    event
                };
                let event = if event.target().is_empty() {
                    event.with_target(device_id)
                } else {
                    event
                };
                Self::Event(event)
            }
            Self::Response(resp) => Self::Response(resp),
        }
    }

    /// Stamp an empty target with the local device id
    pub fn with_default_target(self, device_id: &str) -> Self {
        match self {
            Self::Request(req) if req.target().is_empty() => {
                Self::Request(req.with_target(device_id))
            }
            Self::Event(event) if event.target().is_empty() => {
                Self::Event(event.with_target(device_id))
            }
            other => other,
        }
    }
}

impl From<Request> for Message {
    fn from(req: Request) -> Self {
        Self::Request(req)
    }
}

impl From<Response> for Message {
    fn from(resp: Response) -> Self {
        Self::Response(resp)
    }
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_request_wire_form() {
        let payload = br#"{"type":"request","id":"00112233445566778899aabbccddeeff","target":"hub","action":"music.mpd.play","args":{"resource":"a"},"origin":null}"#;
        let Message::Request(req) = Message::decode(payload).unwrap() else {
            panic!("expected a request");
        };
        assert_eq!(req.id(), "00112233445566778899aabbccddeeff");
        assert_eq!(req.action(), "music.mpd.play");
        assert_eq!(req.origin(), "");
    }

    #[test]
    fn test_decode_event_wire_form() {
        let payload = json!({
            "type": "event",
            "id": "abc",
            "target": "hub",
            "origin": "phone",
            "args": {"type": "hub.event.ping.PingEvent", "message": "ping"}
        });
        let msg = Message::decode(payload.to_string().as_bytes()).unwrap();
        let Message::Event(event) = msg else {
            panic!("expected an event");
        };
        assert_eq!(event.event_type().short_name(), "PingEvent");
        assert_eq!(event.get("message"), Some(&json!("ping")));
        assert!(event.get("type").is_none());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Message::decode(b"not json"),
            Err(MessageError::Malformed { .. })
        ));
        assert!(Message::decode(br#"{"type":"bogus"}"#).is_err());
    }

    #[test]
    fn test_with_defaults_leaves_response_alone() {
        let msg = Message::from(Response::new(1)).with_defaults("hub");
        assert_eq!(msg.target(), None);
    }
}
