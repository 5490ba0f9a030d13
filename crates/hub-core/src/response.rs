//! Action responses

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Request;

/// Result of running an action or a procedure
///
/// `id`, `origin` and `target` are only set when the response answers a
/// specific request; they are omitted from the wire otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl Response {
    /// Successful response carrying `output`
    pub fn new(output: impl Into<Value>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }

    /// Failed response carrying a single error
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Default::default()
        }
    }

    /// Response with both an output and a list of errors
    pub fn with_errors(output: impl Into<Value>, errors: Vec<String>) -> Self {
        Self {
            output: output.into(),
            errors,
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Address this response back to the sender of `request`
    pub fn in_reply_to(mut self, request: &Request) -> Self {
        self.id = Some(request.id().to_string());
        self.origin = Some(request.target().to_string());
        self.target = Some(request.origin().to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Args;
    use serde_json::json;

    #[test]
    fn test_minimal_wire_form() {
        let value = serde_json::to_value(Response::new(json!({"a": 1}))).unwrap();
        assert_eq!(value, json!({"output": {"a": 1}, "errors": []}));
    }

    #[test]
    fn test_in_reply_to_swaps_addresses() {
        let req = Request::builder("a.b")
            .origin("phone")
            .target("hub")
            .args(Args::new())
            .build();
        let resp = Response::error("boom").in_reply_to(&req);

        assert_eq!(resp.id.as_deref(), Some(req.id()));
        assert_eq!(resp.origin.as_deref(), Some("hub"));
        assert_eq!(resp.target.as_deref(), Some("phone"));
        assert!(resp.is_error());
    }
}
