//! Rule engine error types

use hub_procedure::ProcedureError;
use thiserror::Error;

/// Result type for rule operations
pub type RuleResult<T> = Result<T, RuleError>;

/// Errors raised while building conditions and hooks
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid actions for hook '{hook}': {source}")]
    InvalidActions {
        hook: String,
        #[source]
        source: ProcedureError,
    },
}
