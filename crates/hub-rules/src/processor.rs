//! Hook selection and execution for incoming events

use std::sync::Arc;

use hub_core::{Event, Response};
use hub_procedure::{ExecutionContext, Executor};
use tracing::{debug, error, info, trace};

use crate::condition::EventMatchResult;
use crate::hook::{EventHook, HookTable};

/// Receives every non-exempt event for forwarding to web clients
pub trait WebClientNotifier: Send + Sync {
    fn notify(&self, event: &Event);
}

/// Matches events against the hook table and runs the fired hooks
#[derive(Clone)]
pub struct EventProcessor {
    hooks: Arc<HookTable>,
    executor: Executor,
    notifier: Option<Arc<dyn WebClientNotifier>>,
}

impl EventProcessor {
    pub fn new(hooks: HookTable, executor: Executor) -> Self {
        Self {
            hooks: Arc::new(hooks),
            executor,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn WebClientNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn hooks(&self) -> &HookTable {
        &self.hooks
    }

    /// Hooks that fire for `event`, in table order
    ///
    /// Among the matching hooks, a hook fires when it has the highest score
    /// or the highest priority. Both sets are united.
    pub fn select(&self, event: &Event) -> Vec<(Arc<EventHook>, EventMatchResult)> {
        let matched: Vec<_> = self
            .hooks
            .iter()
            .filter_map(|hook| {
                let result = hook.condition.matches(event);
                result.is_match.then(|| (hook.clone(), result))
            })
            .collect();

        let Some(max_score) = matched.iter().map(|(_, r)| r.score).max() else {
            return Vec::new();
        };
        let max_priority = matched
            .iter()
            .map(|(hook, _)| hook.priority)
            .max()
            .unwrap_or_default();

        matched
            .into_iter()
            .filter(|(hook, result)| result.score == max_score || hook.priority == max_priority)
            .collect()
    }

    /// Notify web clients, then run every fired hook
    ///
    /// Returns the name and final response of each hook that ran.
    pub async fn process_event(&self, event: &Event) -> Vec<(String, Response)> {
        if let Some(notifier) = &self.notifier {
            if event.event_type().notifies_web_clients() {
                notifier.notify(event);
            }
        }

        let fired = self.select(event);
        if fired.is_empty() {
            trace!(event_type = %event.event_type(), "No hook matched");
            return Vec::new();
        }

        let mut outcomes = Vec::with_capacity(fired.len());
        for (hook, result) in fired {
            info!(
                hook = %hook.name,
                event_type = %event.event_type(),
                score = result.score,
                priority = hook.priority,
                "Firing event hook"
            );

            let mut ctx = ExecutionContext::from_args(event.args().clone());
            ctx.set("event", event.to_value());
            ctx.extend(result.parsed_args);

            let response = match self.executor.execute(&hook.actions, &mut ctx).await {
                Ok(response) => response,
                Err(err) => {
                    error!(hook = %hook.name, error = %err, "Event hook failed");
                    Response::error(err.to_string())
                }
            };
            debug!(hook = %hook.name, errors = response.errors.len(), "Event hook done");
            outcomes.push((hook.name.clone(), response));
        }
        outcomes
    }
}

impl std::fmt::Debug for EventProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProcessor")
            .field("hooks", &self.hooks.len())
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}
