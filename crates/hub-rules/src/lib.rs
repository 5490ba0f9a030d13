//! Event rule engine
//!
//! Hooks pair an [`EventCondition`] with a procedure. For each incoming event
//! the [`EventProcessor`] scores every hook, fires the best-scoring and the
//! highest-priority matches, and runs their actions with the event's
//! attributes and captured placeholders in scope.

mod condition;
mod error;
mod hook;
mod processor;

pub use condition::{Constraint, EventCondition, EventMatchResult, TextPattern};
pub use error::{RuleError, RuleResult};
pub use hook::{EventHook, HookTable};
pub use processor::{EventProcessor, WebClientNotifier};
