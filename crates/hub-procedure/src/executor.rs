//! Procedure executor
//!
//! Walks a compiled procedure tree against an [`ExecutionContext`], expanding
//! placeholders, dispatching requests with retries and merging each step's
//! response back into the context.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::join_all;
use hub_core::{Args, Request, Response};
use indexmap::IndexMap;
use tracing::{debug, info, trace, warn};

use crate::action::ActionDispatcher;
use crate::context::ExecutionContext;
use crate::error::{ActionError, ActionResult, ProcedureError, ProcedureResult};
use crate::expression;
use crate::procedure::{ConditionalProcedure, LinearProcedure, LoopProcedure, RequestStep, Step};

/// Prefix of actions that call a named procedure
pub const PROCEDURE_ACTION_PREFIX: &str = "procedure.";

/// Nested `procedure.*` calls allowed before giving up
const MAX_CALL_DEPTH: usize = 16;

/// Named procedures callable through `procedure.<name>`
pub type ProcedureTable = IndexMap<String, Arc<LinearProcedure>>;

type ProcedureFuture<'a> = Pin<Box<dyn Future<Output = ProcedureResult<Response>> + Send + 'a>>;

/// Runs procedures against an action dispatcher
#[derive(Clone)]
pub struct Executor {
    dispatcher: Arc<dyn ActionDispatcher>,
    procedures: Arc<ProcedureTable>,
    n_tries: u32,
}

impl Executor {
    pub fn new(dispatcher: Arc<dyn ActionDispatcher>) -> Self {
        Self {
            dispatcher,
            procedures: Arc::new(ProcedureTable::new()),
            n_tries: 1,
        }
    }

    /// Make `procedure.<name>` actions resolve against `procedures`
    pub fn with_procedures(mut self, procedures: ProcedureTable) -> Self {
        self.procedures = Arc::new(procedures);
        self
    }

    /// Default number of attempts for a failing request
    pub fn with_n_tries(mut self, n_tries: u32) -> Self {
        self.n_tries = n_tries.max(1);
        self
    }

    pub fn procedure(&self, name: &str) -> Option<&Arc<LinearProcedure>> {
        self.procedures.get(name)
    }

    /// Execute `procedure` against `ctx`
    ///
    /// Action failures end up in the returned response's `errors`; an `Err`
    /// is only returned when the tree itself cannot be walked (a loop source
    /// that is not iterable, a condition that fails to evaluate).
    pub async fn execute(
        &self,
        procedure: &LinearProcedure,
        ctx: &mut ExecutionContext,
    ) -> ProcedureResult<Response> {
        debug!(procedure = %procedure.name, steps = procedure.steps.len(), "Executing procedure");
        self.run_linear(procedure, ctx, 0).await
    }

    /// Execute `procedure` in a fresh context seeded with `args`
    pub async fn run(&self, procedure: &LinearProcedure, args: Args) -> ProcedureResult<Response> {
        let mut ctx = ExecutionContext::for_call(&procedure.args, args);
        self.execute(procedure, &mut ctx).await
    }

    /// Execute a named procedure from the table
    pub async fn call_procedure(&self, name: &str, args: Args) -> ProcedureResult<Response> {
        let procedure = self
            .procedures
            .get(name)
            .cloned()
            .ok_or_else(|| ProcedureError::NotFound(name.to_string()))?;
        self.run(&procedure, args).await
    }

    /// Run a request received from the bus and address the response back
    pub async fn execute_request(&self, request: &Request) -> Response {
        self.request_with_retries(request.action(), request.args().clone(), self.n_tries, 0)
            .await
            .in_reply_to(request)
    }

    fn run_linear<'a>(
        &'a self,
        procedure: &'a LinearProcedure,
        ctx: &'a mut ExecutionContext,
        depth: usize,
    ) -> ProcedureFuture<'a> {
        Box::pin(async move {
            if procedure.concurrent {
                return self.run_concurrent(procedure, ctx, depth).await;
            }

            let mut last = Response::default();
            for step in &procedure.steps {
                let response = self.run_step(step, ctx, depth).await?;
                ctx.merge_response(&response);
                last = response;
            }
            Ok(last)
        })
    }

    /// Every step runs on its own copy of the context; nothing is merged back
    async fn run_concurrent(
        &self,
        procedure: &LinearProcedure,
        ctx: &ExecutionContext,
        depth: usize,
    ) -> ProcedureResult<Response> {
        let branches = procedure.steps.iter().map(|step| {
            let mut branch_ctx = ctx.clone();
            async move { self.run_step(step, &mut branch_ctx, depth).await }
        });

        let mut last = Response::default();
        for result in join_all(branches).await {
            last = result?;
        }
        Ok(last)
    }

    async fn run_step(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        depth: usize,
    ) -> ProcedureResult<Response> {
        match step {
            Step::Request(request) => Ok(self.run_request(request, ctx, depth).await),
            Step::Loop(loop_proc) => self.run_loop(loop_proc, ctx, depth).await,
            Step::Conditional(cond) => self.run_conditional(cond, ctx, depth).await,
        }
    }

    async fn run_request(
        &self,
        step: &RequestStep,
        ctx: &ExecutionContext,
        depth: usize,
    ) -> Response {
        let args = expression::expand_args(&step.args, ctx.vars());
        let n_tries = step.n_tries.unwrap_or(self.n_tries).max(1);
        trace!(action = %step.action, ?args, "Running request step");
        self.request_with_retries(&step.action, args, n_tries, depth)
            .await
    }

    async fn run_loop(
        &self,
        loop_proc: &LoopProcedure,
        ctx: &mut ExecutionContext,
        depth: usize,
    ) -> ProcedureResult<Response> {
        let items = expression::evaluate_iterable(&loop_proc.iterable_expr, ctx.vars())?;
        debug!(
            iterator = %loop_proc.iterator_name,
            items = items.len(),
            fork = loop_proc.concurrent,
            "Running loop"
        );

        let mut last = Response::default();
        for item in items {
            ctx.set(loop_proc.iterator_name.clone(), item);
            last = self.run_linear(&loop_proc.body, ctx, depth).await?;
        }
        Ok(last)
    }

    async fn run_conditional(
        &self,
        cond: &ConditionalProcedure,
        ctx: &mut ExecutionContext,
        depth: usize,
    ) -> ProcedureResult<Response> {
        let taken = expression::evaluate_bool(&cond.condition_expr, ctx.vars())?;
        trace!(condition = %cond.condition_expr, taken, "Evaluated condition");

        if taken {
            self.run_linear(&cond.then_branch, ctx, depth).await
        } else if let Some(else_branch) = &cond.else_branch {
            self.run_linear(else_branch, ctx, depth).await
        } else {
            Ok(Response::default())
        }
    }

    /// Attempt an action up to `n_tries` times
    ///
    /// Permission and not-found failures are attempted once. The last
    /// failure is recorded in the response rather than returned.
    async fn request_with_retries(
        &self,
        action: &str,
        args: Args,
        n_tries: u32,
        depth: usize,
    ) -> Response {
        let mut attempt = 1;
        loop {
            match self.call(action, args.clone(), depth).await {
                Ok(response) => return response,
                Err(err) if !err.is_retryable() => {
                    info!(action = %action, error = %err, "Action failed, not retrying");
                    return Response::error(err.to_string());
                }
                Err(err) if attempt < n_tries => {
                    warn!(action = %action, attempt, n_tries, error = %err, "Action failed, retrying");
                    attempt += 1;
                }
                Err(err) => {
                    warn!(action = %action, attempts = attempt, error = %err, "Action failed");
                    return Response::error(err.to_string());
                }
            }
        }
    }

    async fn call(&self, action: &str, args: Args, depth: usize) -> ActionResult {
        let called = action
            .strip_prefix(PROCEDURE_ACTION_PREFIX)
            .and_then(|name| self.procedures.get(name));

        let Some(procedure) = called else {
            return self.dispatcher.dispatch(action, args).await;
        };

        if depth >= MAX_CALL_DEPTH {
            return Err(ActionError::failed(
                action,
                ProcedureError::DepthExceeded(MAX_CALL_DEPTH),
            ));
        }

        let mut ctx = ExecutionContext::for_call(&procedure.args, args);
        self.run_linear(procedure, &mut ctx, depth + 1)
            .await
            .map_err(|err| ActionError::failed(action, err))
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("procedures", &self.procedures.keys().collect::<Vec<_>>())
            .field("n_tries", &self.n_tries)
            .finish()
    }
}
