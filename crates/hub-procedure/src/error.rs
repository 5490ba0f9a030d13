//! Error types for procedures, expressions and actions

use thiserror::Error;

/// Result type for expression evaluation
pub type ExpressionResult<T> = Result<T, ExpressionError>;

/// Result type for building and running procedures
pub type ProcedureResult<T> = Result<T, ProcedureError>;

/// Result type returned by action handlers
pub type ActionResult = Result<hub_core::Response, ActionError>;

/// Errors raised while compiling or evaluating an expression
#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("invalid expression `{expr}`: {message}")]
    Syntax { expr: String, message: String },

    #[error("failed to evaluate `{expr}`: {message}")]
    Eval { expr: String, message: String },

    #[error("`{expr}` is undefined in the current context")]
    Undefined { expr: String },

    #[error("`{expr}` evaluated to {kind}, which cannot be iterated")]
    NotIterable { expr: String, kind: &'static str },
}

/// Errors raised while building or executing a procedure tree
#[derive(Debug, Error)]
pub enum ProcedureError {
    #[error("invalid step in procedure '{procedure}': {message}")]
    InvalidStep { procedure: String, message: String },

    #[error("'else' without a preceding 'if' in procedure '{procedure}'")]
    DanglingElse { procedure: String },

    #[error("procedure not found: {0}")]
    NotFound(String),

    #[error("procedure call depth exceeded {0}")]
    DepthExceeded(usize),

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

/// Failure classes an action dispatcher can report
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    /// No handler is registered for the action; never retried
    #[error("action not found: {0}")]
    NotFound(String),

    /// The caller is not allowed to run the action; never retried
    #[error("permission denied for {action}: {message}")]
    Permission { action: String, message: String },

    /// Any other failure; retried up to the configured number of tries
    #[error("action {action} failed: {message}")]
    Failed { action: String, message: String },
}

impl ActionError {
    pub fn failed(action: impl Into<String>, message: impl ToString) -> Self {
        Self::Failed {
            action: action.into(),
            message: message.to_string(),
        }
    }

    pub fn permission(action: impl Into<String>, message: impl ToString) -> Self {
        Self::Permission {
            action: action.into(),
            message: message.to_string(),
        }
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
