//! Event hooks and the hook table

use std::sync::Arc;

use hub_procedure::LinearProcedure;
use indexmap::IndexMap;
use serde_json::Value;

use crate::condition::EventCondition;
use crate::error::{RuleError, RuleResult};

/// A condition bound to the actions it fires
#[derive(Debug, Clone)]
pub struct EventHook {
    pub name: String,
    pub condition: EventCondition,
    pub actions: LinearProcedure,
    pub priority: i64,
}

impl EventHook {
    pub fn new(name: impl Into<String>, condition: EventCondition, actions: LinearProcedure) -> Self {
        Self {
            name: name.into(),
            condition,
            actions,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Build a hook from its condition mapping and action list
    pub fn from_config(
        name: impl Into<String>,
        condition: &Value,
        actions: &[Value],
        priority: i64,
    ) -> RuleResult<Self> {
        let name = name.into();
        let condition = EventCondition::from_config(condition)?;
        let actions = LinearProcedure::build(format!("event_hook.{name}"), actions).map_err(
            |source| RuleError::InvalidActions {
                hook: name.clone(),
                source,
            },
        )?;
        Ok(Self::new(name, condition, actions).with_priority(priority))
    }
}

/// Registered hooks in registration order
///
/// Re-registering a name replaces the hook in place.
#[derive(Debug, Clone, Default)]
pub struct HookTable {
    hooks: IndexMap<String, Arc<EventHook>>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook`, returning the one it replaced
    pub fn register(&mut self, hook: EventHook) -> Option<Arc<EventHook>> {
        self.hooks.insert(hook.name.clone(), Arc::new(hook))
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<EventHook>> {
        self.hooks.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<EventHook>> {
        self.hooks.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EventHook>> {
        self.hooks.values()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
