//! One-shot cronjob instances

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use hub_procedure::{ExecutionContext, Executor, LinearProcedure};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{CronError, CronResult};

/// Lifecycle of a single job instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CronjobState {
    Idle,
    Wait,
    Running,
    Done,
    Error,
}

impl CronjobState {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl fmt::Display for CronjobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Wait => "wait",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Parse a cron expression
///
/// Standard 5-field expressions get a leading seconds field of `0`; 6 and 7
/// field forms and `@hourly`-style shorthands are passed through.
pub fn parse_schedule(expression: &str) -> Result<Schedule, cron::error::Error> {
    let expression = expression.trim();
    if !expression.starts_with('@') && expression.split_whitespace().count() == 5 {
        return Schedule::from_str(&format!("0 {expression}"));
    }
    Schedule::from_str(expression)
}

/// A configured cronjob: name, schedule and the procedure it runs
#[derive(Debug, Clone)]
pub struct CronjobDefinition {
    pub name: String,
    pub expression: String,
    schedule: Schedule,
    pub actions: Arc<LinearProcedure>,
}

impl CronjobDefinition {
    pub fn new(
        name: impl Into<String>,
        expression: impl Into<String>,
        actions: LinearProcedure,
    ) -> CronResult<Self> {
        let name = name.into();
        let expression = expression.into();
        let schedule = parse_schedule(&expression).map_err(|source| CronError::InvalidExpression {
            name: name.clone(),
            expression: expression.clone(),
            source,
        })?;

        Ok(Self {
            name,
            expression,
            schedule,
            actions: Arc::new(actions),
        })
    }

    /// Next fire time strictly after `after`
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

/// A single fire cycle of a cronjob
///
/// The instance waits for the next fire time, runs its procedure once and
/// finishes. The scheduler replaces finished instances with fresh ones.
pub struct Cronjob {
    name: String,
    state: watch::Receiver<CronjobState>,
    scheduled_for: Arc<OnceLock<DateTime<Utc>>>,
    handle: JoinHandle<()>,
}

impl Cronjob {
    /// Start a new instance that fires after `not_before`, or after now
    pub fn spawn(
        definition: Arc<CronjobDefinition>,
        executor: Executor,
        not_before: Option<DateTime<Utc>>,
    ) -> Self {
        let (state_tx, state) = watch::channel(CronjobState::Idle);
        let scheduled_for = Arc::new(OnceLock::new());
        let name = definition.name.clone();

        let slot = scheduled_for.clone();
        let handle = tokio::spawn(async move {
            let final_state = run_once(&definition, &executor, not_before, &slot, &state_tx).await;
            state_tx.send_replace(final_state);
        });

        Self {
            name,
            state,
            scheduled_for,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CronjobState {
        *self.state.borrow()
    }

    /// Watch state transitions of this instance
    pub fn subscribe(&self) -> watch::Receiver<CronjobState> {
        self.state.clone()
    }

    /// Fire time computed by this instance, once it has entered `Wait`
    pub fn scheduled_for(&self) -> Option<DateTime<Utc>> {
        self.scheduled_for.get().copied()
    }

    /// Whether this instance reached a terminal state or its task ended
    pub fn is_finished(&self) -> bool {
        self.state().is_finished() || self.handle.is_finished()
    }
}

impl fmt::Debug for Cronjob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cronjob")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("scheduled_for", &self.scheduled_for())
            .finish()
    }
}

async fn run_once(
    definition: &CronjobDefinition,
    executor: &Executor,
    not_before: Option<DateTime<Utc>>,
    scheduled_for: &OnceLock<DateTime<Utc>>,
    state: &watch::Sender<CronjobState>,
) -> CronjobState {
    state.send_replace(CronjobState::Wait);

    let now = Utc::now();
    let after = not_before.map_or(now, |t| t.max(now));
    let Some(fire_at) = definition.next_fire(after) else {
        warn!(cronjob = %definition.name, "Schedule has no upcoming fire time");
        return CronjobState::Error;
    };
    let _ = scheduled_for.set(fire_at);

    let delay = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    debug!(cronjob = %definition.name, fire_at = %fire_at, delay_ms = delay.as_millis() as u64, "Waiting");
    tokio::time::sleep(delay).await;

    state.send_replace(CronjobState::Running);
    info!(cronjob = %definition.name, "Running cronjob");

    let mut ctx = ExecutionContext::new();
    match executor.execute(&definition.actions, &mut ctx).await {
        Ok(response) => {
            if response.is_error() {
                warn!(cronjob = %definition.name, errors = ?response.errors, "Cronjob actions reported errors");
            }
            CronjobState::Done
        }
        Err(err) => {
            error!(cronjob = %definition.name, error = %err, "Cronjob failed");
            CronjobState::Error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn noop() -> LinearProcedure {
        LinearProcedure::build("noop", &[]).unwrap()
    }

    #[test]
    fn test_five_field_expression() {
        let def = CronjobDefinition::new("every_minute", "* * * * *", noop()).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 30).unwrap();
        let next = def.next_fire(start).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 12, 1, 0).unwrap());
    }

    #[test]
    fn test_six_field_expression() {
        let def = CronjobDefinition::new("every_10s", "*/10 * * * * *", noop()).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 31).unwrap();
        assert_eq!(def.next_fire(start).unwrap().second(), 40);
    }

    #[test]
    fn test_shorthand_expression() {
        let def = CronjobDefinition::new("hourly", "@hourly", noop()).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 15, 0).unwrap();
        assert_eq!(
            def.next_fire(start).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_invalid_expression_is_rejected() {
        let err = CronjobDefinition::new("broken", "not a schedule", noop()).unwrap_err();
        assert!(matches!(err, CronError::InvalidExpression { name, .. } if name == "broken"));
    }

    #[test]
    fn test_finished_states() {
        assert!(CronjobState::Done.is_finished());
        assert!(CronjobState::Error.is_finished());
        assert!(!CronjobState::Wait.is_finished());
        assert!(!CronjobState::Running.is_finished());
        assert_eq!(CronjobState::Running.to_string(), "running");
    }
}
