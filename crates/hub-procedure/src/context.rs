//! Per-execution variable context

use hub_core::{Args, Response};
use serde_json::Value;

/// Variables visible to expressions while a procedure runs
///
/// A fresh context is created for every execution; step outputs are merged
/// back into it so later steps can refer to earlier results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    vars: Args,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a context with existing variables
    pub fn from_args(vars: Args) -> Self {
        Self { vars }
    }

    /// Seed a context for a procedure call
    ///
    /// Every declared parameter is bound (to `null` when the caller did not
    /// pass it) and extra arguments are kept as well.
    pub fn for_call(params: &[String], mut args: Args) -> Self {
        for param in params {
            args.entry(param.clone()).or_insert(Value::Null);
        }
        Self { vars: args }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    /// Copy every entry of `other` into this context
    pub fn extend(&mut self, other: Args) {
        self.vars.extend(other);
    }

    pub fn vars(&self) -> &Args {
        &self.vars
    }

    pub fn into_vars(self) -> Args {
        self.vars
    }

    /// Merge a step's response into the context
    ///
    /// Map outputs have each key copied in; `output` and `errors` always
    /// reflect the most recent step.
    pub fn merge_response(&mut self, response: &Response) {
        if let Value::Object(map) = &response.output {
            for (k, v) in map {
                self.vars.insert(k.clone(), v.clone());
            }
        }

        self.vars
            .insert("output".to_string(), response.output.clone());
        self.vars.insert(
            "errors".to_string(),
            Value::Array(response.errors.iter().cloned().map(Value::String).collect()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_map_output() {
        let mut ctx = ExecutionContext::new();
        ctx.set("keep", json!(1));
        ctx.merge_response(&Response::new(json!({"volume": 40, "keep": 2})));

        assert_eq!(ctx.get("volume"), Some(&json!(40)));
        assert_eq!(ctx.get("keep"), Some(&json!(2)));
        assert_eq!(ctx.get("output"), Some(&json!({"volume": 40, "keep": 2})));
        assert_eq!(ctx.get("errors"), Some(&json!([])));
    }

    #[test]
    fn test_merge_scalar_output_and_errors() {
        let mut ctx = ExecutionContext::new();
        ctx.merge_response(&Response::with_errors(json!("done"), vec!["late".into()]));

        assert_eq!(ctx.get("output"), Some(&json!("done")));
        assert_eq!(ctx.get("errors"), Some(&json!(["late"])));
        assert_eq!(ctx.vars().len(), 2);
    }

    #[test]
    fn test_for_call_binds_declared_params() {
        let mut args = Args::new();
        args.insert("room".into(), json!("kitchen"));
        args.insert("extra".into(), json!(true));
        let ctx = ExecutionContext::for_call(&["room".into(), "level".into()], args);

        assert_eq!(ctx.get("room"), Some(&json!("kitchen")));
        assert_eq!(ctx.get("level"), Some(&Value::Null));
        assert_eq!(ctx.get("extra"), Some(&json!(true)));
    }
}
