//! Action requests

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{new_message_id, null_as_empty};
use crate::Args;

/// A request to run a named action on a target node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "new_message_id")]
    id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    target: String,
    action: String,
    #[serde(default)]
    args: Args,
    #[serde(default, deserialize_with = "null_as_empty")]
    origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

impl Request {
    /// Start building a request for `action`
    pub fn builder(action: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(action)
    }

    /// Shorthand for a request with arguments and nothing else set
    pub fn new(action: impl Into<String>, args: Args) -> Self {
        Self::builder(action).args(args).build()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Dotted action name, e.g. `music.mpd.play`
    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Readdress the request to another node
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Fill in an empty origin or target with `device_id`
    pub fn with_defaults(mut self, device_id: &str) -> Self {
        if self.origin.is_empty() {
            self.origin = device_id.to_string();
        }
        if self.target.is_empty() {
            self.target = device_id.to_string();
        }
        self
    }
}

/// Builder for [`Request`]
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    id: Option<String>,
    target: String,
    action: String,
    args: Args,
    origin: String,
    token: Option<String>,
}

impl RequestBuilder {
    fn new(action: impl Into<String>) -> Self {
        Self {
            id: None,
            target: String::new(),
            action: action.into(),
            args: Args::new(),
            origin: String::new(),
            token: None,
        }
    }

    /// Reuse an existing id (e.g. when re-emitting a request)
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Replace all arguments
    pub fn args(mut self, args: Args) -> Self {
        self.args = args;
        self
    }

    /// Add a single argument
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Request {
        Request {
            id: self.id.unwrap_or_else(new_message_id),
            target: self.target,
            action: self.action,
            args: self.args,
            origin: self.origin,
            token: self.token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_generates_id() {
        let req = Request::builder("light.turn_on").arg("brightness", 200).build();
        assert_eq!(req.id().len(), 32);
        assert_eq!(req.action(), "light.turn_on");
        assert_eq!(req.args()["brightness"], json!(200));
        assert!(req.token().is_none());
    }

    #[test]
    fn test_with_defaults_only_fills_empty_fields() {
        let req = Request::builder("a.b").target("other").build().with_defaults("me");
        assert_eq!(req.target(), "other");
        assert_eq!(req.origin(), "me");
    }

    #[test]
    fn test_null_origin_and_missing_id_on_wire() {
        let req: Request = serde_json::from_value(json!({
            "target": "node",
            "action": "music.mpd.play",
            "args": {"resource": "x"},
            "origin": null
        }))
        .unwrap();

        assert_eq!(req.origin(), "");
        assert_eq!(req.id().len(), 32);
        assert_eq!(req.args()["resource"], json!("x"));
    }

    #[test]
    fn test_token_omitted_when_absent() {
        let value = serde_json::to_value(Request::new("a.b", Args::new())).unwrap();
        assert!(value.get("token").is_none());

        let value = serde_json::to_value(Request::builder("a.b").token("s3cret").build()).unwrap();
        assert_eq!(value["token"], json!("s3cret"));
    }
}
