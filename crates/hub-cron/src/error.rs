//! Scheduler error types

use thiserror::Error;

/// Result type for scheduler operations
pub type CronResult<T> = Result<T, CronError>;

#[derive(Debug, Error)]
pub enum CronError {
    #[error("invalid cron expression `{expression}` for job '{name}': {source}")]
    InvalidExpression {
        name: String,
        expression: String,
        #[source]
        source: cron::error::Error,
    },

    #[error("duplicate cronjob '{0}'")]
    Duplicate(String),
}
