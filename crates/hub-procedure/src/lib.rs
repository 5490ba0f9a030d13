//! Procedure interpreter
//!
//! Procedures are trees of steps compiled once from configuration:
//!
//! - Requests: a named action with arguments, retried up to `n_tries` times
//! - Loops: `for`/`fork` over the items of an expression
//! - Conditionals: `if`, with an optional `else`
//!
//! Argument values, loop sources and conditions may contain `${expr}`
//! placeholders, evaluated against the execution context by a restricted
//! expression evaluator.
//!
//! # Key Types
//!
//! - [`LinearProcedure`] - A compiled list of steps
//! - [`Executor`] - Runs procedures against an [`ActionDispatcher`]
//! - [`ActionRegistry`] - In-process dispatcher keyed by action name

pub mod action;
pub mod context;
pub mod error;
pub mod executor;
pub mod expression;
pub mod procedure;

pub use action::{ActionDispatcher, ActionFuture, ActionHandler, ActionRegistry};
pub use context::ExecutionContext;
pub use error::{
    ActionError, ActionResult, ExpressionError, ExpressionResult, ProcedureError, ProcedureResult,
};
pub use executor::{Executor, ProcedureTable, PROCEDURE_ACTION_PREFIX};
pub use procedure::{ConditionalProcedure, LinearProcedure, LoopProcedure, RequestStep, Step};
