//! Procedure trees and their compilation from declarative step lists
//!
//! A step list is a sequence of maps. Each map is one of:
//!
//! - `{action: <name>, args: {...}, n_tries: <n>}`: a request
//! - `{"for <name> in <expr>": [steps]}`: a sequential loop
//! - `{"fork <name> in <expr>": [steps]}`: a loop declared concurrent
//! - `{"if <expr>": [steps]}`: a conditional, optionally followed by a
//!   sibling `{"else": [steps]}`
//!
//! Expressions may be written bare or wrapped in `${...}`.

use std::sync::OnceLock;

use hub_core::Args;
use regex::Regex;
use serde_json::Value;

use crate::error::{ProcedureError, ProcedureResult};
use crate::expression;

fn loop_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(for|fork)\s+([A-Za-z_][A-Za-z0-9_]*)\s+in\s+(.+?)\s*:?\s*$")
            .expect("loop header regex is valid")
    })
}

fn if_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*if\s+(.+?)\s*:?\s*$").expect("if header regex is valid"))
}

/// A request template; argument placeholders are expanded at run time
#[derive(Debug, Clone, PartialEq)]
pub struct RequestStep {
    pub action: String,
    pub args: Args,
    /// Overrides the executor's default number of attempts
    pub n_tries: Option<u32>,
}

/// One node of a procedure tree
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Request(RequestStep),
    Loop(LoopProcedure),
    Conditional(ConditionalProcedure),
}

/// An ordered list of steps
#[derive(Debug, Clone, PartialEq)]
pub struct LinearProcedure {
    pub name: String,
    /// Declared parameter names
    pub args: Vec<String>,
    /// Run all steps at once on copies of the context instead of in order
    pub concurrent: bool,
    pub steps: Vec<Step>,
}

/// `for`/`fork` loop over the items of an expression
#[derive(Debug, Clone, PartialEq)]
pub struct LoopProcedure {
    pub iterator_name: String,
    pub iterable_expr: String,
    pub body: LinearProcedure,
    /// Set for `fork` loops; iterations still run in order
    pub concurrent: bool,
}

/// `if`/`else` branch
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalProcedure {
    pub condition_expr: String,
    pub then_branch: LinearProcedure,
    pub else_branch: Option<LinearProcedure>,
}

impl LinearProcedure {
    /// Compile a declarative step list
    pub fn build(name: impl Into<String>, specs: &[Value]) -> ProcedureResult<Self> {
        let name = name.into();
        let steps = build_steps(&name, specs)?;
        Ok(Self {
            name,
            args: Vec::new(),
            concurrent: false,
            steps,
        })
    }

    /// Declare the parameters callers may pass
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn invalid(procedure: &str, message: impl Into<String>) -> ProcedureError {
    ProcedureError::InvalidStep {
        procedure: procedure.to_string(),
        message: message.into(),
    }
}

fn build_steps(procedure: &str, specs: &[Value]) -> ProcedureResult<Vec<Step>> {
    let mut steps: Vec<Step> = Vec::with_capacity(specs.len());

    for spec in specs {
        let Value::Object(map) = spec else {
            return Err(invalid(procedure, format!("expected a map, got {spec}")));
        };

        let header = match map.len() {
            1 if !map.contains_key("action") => map.iter().next(),
            _ => None,
        };

        if let Some((key, body)) = header {
            if key.trim() == "else" {
                match steps.last_mut() {
                    Some(Step::Conditional(cond)) if cond.else_branch.is_none() => {
                        cond.else_branch = Some(build_branch(procedure, body)?);
                        continue;
                    }
                    _ => {
                        return Err(ProcedureError::DanglingElse {
                            procedure: procedure.to_string(),
                        })
                    }
                }
            }

            if let Some(caps) = loop_header().captures(key) {
                let iterable_expr = expression::unwrap_placeholder(&caps[3]).to_string();
                expression::check(&iterable_expr)?;
                steps.push(Step::Loop(LoopProcedure {
                    iterator_name: caps[2].to_string(),
                    iterable_expr,
                    body: build_branch(procedure, body)?,
                    concurrent: &caps[1] == "fork",
                }));
                continue;
            }

            if let Some(caps) = if_header().captures(key) {
                let condition_expr = expression::unwrap_placeholder(&caps[1]).to_string();
                expression::check(&condition_expr)?;
                steps.push(Step::Conditional(ConditionalProcedure {
                    condition_expr,
                    then_branch: build_branch(procedure, body)?,
                    else_branch: None,
                }));
                continue;
            }

            return Err(invalid(procedure, format!("unrecognized step `{key}`")));
        }

        steps.push(Step::Request(build_request(procedure, map)?));
    }

    Ok(steps)
}

fn build_branch(procedure: &str, body: &Value) -> ProcedureResult<LinearProcedure> {
    let steps = match body {
        Value::Array(specs) => build_steps(procedure, specs)?,
        Value::Object(_) => build_steps(procedure, std::slice::from_ref(body))?,
        Value::Null => Vec::new(),
        other => {
            return Err(invalid(
                procedure,
                format!("expected a list of steps, got {other}"),
            ))
        }
    };

    Ok(LinearProcedure {
        name: procedure.to_string(),
        args: Vec::new(),
        concurrent: false,
        steps,
    })
}

fn build_request(
    procedure: &str,
    map: &serde_json::Map<String, Value>,
) -> ProcedureResult<RequestStep> {
    let action = match map.get("action") {
        Some(Value::String(action)) if !action.is_empty() => action.clone(),
        Some(other) => return Err(invalid(procedure, format!("invalid action {other}"))),
        None => return Err(invalid(procedure, "step has no action")),
    };

    let args = match map.get("args") {
        None | Some(Value::Null) => Args::new(),
        Some(Value::Object(args)) => args.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Some(other) => {
            return Err(invalid(
                procedure,
                format!("args of {action} must be a map, got {other}"),
            ))
        }
    };

    let n_tries = match map.get("n_tries") {
        None | Some(Value::Null) => None,
        Some(value) => match value.as_u64() {
            Some(n) if n >= 1 => Some(u32::try_from(n).unwrap_or(u32::MAX)),
            _ => {
                return Err(invalid(
                    procedure,
                    format!("n_tries of {action} must be a positive integer"),
                ))
            }
        },
    };

    Ok(RequestStep {
        action,
        args,
        n_tries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn specs(value: Value) -> Vec<Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_build_request_steps() {
        let proc = LinearProcedure::build(
            "morning",
            &specs(json!([
                {"action": "light.on", "args": {"room": "kitchen"}},
                {"action": "music.mpd.play", "n_tries": 3}
            ])),
        )
        .unwrap();

        assert_eq!(proc.steps.len(), 2);
        let Step::Request(first) = &proc.steps[0] else {
            panic!("expected request");
        };
        assert_eq!(first.action, "light.on");
        assert_eq!(first.args["room"], json!("kitchen"));
        assert_eq!(first.n_tries, None);

        let Step::Request(second) = &proc.steps[1] else {
            panic!("expected request");
        };
        assert_eq!(second.n_tries, Some(3));
    }

    #[test]
    fn test_request_args_keep_declaration_order() {
        let proc = LinearProcedure::build(
            "p",
            &specs(json!([{"action": "a.b", "args": {"zeta": 1, "alpha": 2, "mid": 3}}])),
        )
        .unwrap();

        let Step::Request(step) = &proc.steps[0] else {
            panic!("expected request");
        };
        let keys: Vec<_> = step.args.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_build_loops() {
        let proc = LinearProcedure::build(
            "p",
            &specs(json!([
                {"for x in ${[1, 2, 3]}": [{"action": "a.b"}]},
                {"fork light in lights": [{"action": "a.c"}]}
            ])),
        )
        .unwrap();

        let Step::Loop(for_loop) = &proc.steps[0] else {
            panic!("expected loop");
        };
        assert_eq!(for_loop.iterator_name, "x");
        assert_eq!(for_loop.iterable_expr, "[1, 2, 3]");
        assert!(!for_loop.concurrent);
        assert_eq!(for_loop.body.steps.len(), 1);

        let Step::Loop(fork_loop) = &proc.steps[1] else {
            panic!("expected loop");
        };
        assert_eq!(fork_loop.iterable_expr, "lights");
        assert!(fork_loop.concurrent);
    }

    #[test]
    fn test_build_if_else() {
        let proc = LinearProcedure::build(
            "p",
            &specs(json!([
                {"if ${level > 50}": [{"action": "a.high"}]},
                {"else": [{"action": "a.low"}, {"action": "a.lower"}]},
                {"action": "a.after"}
            ])),
        )
        .unwrap();

        assert_eq!(proc.steps.len(), 2);
        let Step::Conditional(cond) = &proc.steps[0] else {
            panic!("expected conditional");
        };
        assert_eq!(cond.condition_expr, "level > 50");
        assert_eq!(cond.then_branch.steps.len(), 1);
        assert_eq!(cond.else_branch.as_ref().map(|b| b.steps.len()), Some(2));
    }

    #[test]
    fn test_dangling_else_is_rejected() {
        let result = LinearProcedure::build(
            "p",
            &specs(json!([{"action": "a.b"}, {"else": [{"action": "a.c"}]}])),
        );
        assert!(matches!(result, Err(ProcedureError::DanglingElse { .. })));
    }

    #[test]
    fn test_invalid_steps_are_rejected() {
        assert!(LinearProcedure::build("p", &specs(json!([{"args": {}}]))).is_err());
        assert!(LinearProcedure::build("p", &specs(json!(["light.on"]))).is_err());
        assert!(LinearProcedure::build("p", &specs(json!([{"action": "a", "n_tries": 0}]))).is_err());
        assert!(LinearProcedure::build("p", &specs(json!([{"while x": []}]))).is_err());
    }

    #[test]
    fn test_bad_expression_fails_at_build_time() {
        let result = LinearProcedure::build("p", &specs(json!([{"if ${1 +}": []}])));
        assert!(matches!(result, Err(ProcedureError::Expression(_))));
    }
}
