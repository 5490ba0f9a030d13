//! Action dispatch
//!
//! The interpreter never runs an action itself: it hands `(action, args)` to
//! an [`ActionDispatcher`]. [`ActionRegistry`] is the in-process dispatcher
//! the hub uses, mapping dotted action names to async handlers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use hub_core::Args;
use tracing::{debug, warn};

use crate::error::{ActionError, ActionResult};

/// Runs a named action and reports a classified failure
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(&self, action: &str, args: Args) -> ActionResult;
}

/// Future type for async action handlers
pub type ActionFuture = Pin<Box<dyn Future<Output = ActionResult> + Send>>;

/// Action handler function type
pub type ActionHandler = Arc<dyn Fn(Args) -> ActionFuture + Send + Sync>;

/// Registry of actions keyed by their dotted name
pub struct ActionRegistry {
    actions: DashMap<String, ActionHandler>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: DashMap::new(),
        }
    }

    /// Register (or replace) the handler for `action`
    pub fn register<F, Fut>(&self, action: impl Into<String>, handler: F)
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        let action = action.into();
        debug!(action = %action, "Registering action");

        let handler: ActionHandler = Arc::new(move |args| Box::pin(handler(args)) as ActionFuture);
        self.actions.insert(action, handler);
    }

    /// Remove an action, returning whether it was registered
    pub fn unregister(&self, action: &str) -> bool {
        self.actions.remove(action).is_some()
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    /// Registered action names, sorted
    pub fn actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionDispatcher for ActionRegistry {
    async fn dispatch(&self, action: &str, args: Args) -> ActionResult {
        let handler = match self.actions.get(action) {
            Some(entry) => entry.value().clone(),
            None => {
                warn!(action = %action, "Action not found");
                return Err(ActionError::NotFound(action.to_string()));
            }
        };

        debug!(action = %action, "Dispatching action");
        handler(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::Response;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_dispatch() {
        let registry = ActionRegistry::new();
        registry.register("math.double", |args: Args| async move {
            let n = args.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(Response::new(json!(n * 2)))
        });

        assert!(registry.has_action("math.double"));
        let mut args = Args::new();
        args.insert("n".into(), json!(21));
        let resp = registry.dispatch("math.double", args).await.unwrap();
        assert_eq!(resp.output, json!(42));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_action() {
        let registry = ActionRegistry::new();
        let err = registry.dispatch("nope.nothing", Args::new()).await.unwrap_err();
        assert!(matches!(err, ActionError::NotFound(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unregister_and_listing() {
        let registry = ActionRegistry::new();
        registry.register("b.two", |_| async { Ok(Response::default()) });
        registry.register("a.one", |_| async { Ok(Response::default()) });

        assert_eq!(registry.actions(), vec!["a.one", "b.two"]);
        assert!(registry.unregister("b.two"));
        assert!(!registry.unregister("b.two"));
        assert_eq!(registry.len(), 1);
    }
}
