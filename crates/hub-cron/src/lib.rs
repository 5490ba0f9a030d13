//! Cron scheduler
//!
//! Every configured [`CronjobDefinition`] gets a one-shot [`Cronjob`]
//! instance that waits for the next fire time, runs its procedure and
//! finishes in `Done` or `Error`. The [`CronScheduler`] ticks at a short fixed
//! interval and starts a fresh instance for every cronjob whose previous one
//! has finished.

mod error;
mod job;
mod scheduler;

pub use error::{CronError, CronResult};
pub use job::{parse_schedule, Cronjob, CronjobDefinition, CronjobState};
pub use scheduler::{CronScheduler, DEFAULT_TICK_INTERVAL};
