//! Restricted expression evaluation and `${...}` placeholder expansion
//!
//! Expressions are compiled by minijinja's expression compiler inside an
//! empty environment: no filters, tests, functions or globals are available,
//! only variable and attribute/index lookup, literals (numbers, strings,
//! lists, maps, booleans, `none`), arithmetic, comparisons, `in` and the
//! `and`/`or`/`not` connectives. Nothing an expression does can reach outside
//! the context it is evaluated against.

use hub_core::Args;
use minijinja::Environment;
use serde_json::Value;
use tracing::trace;

use crate::error::{ExpressionError, ExpressionResult};

/// Check that `expr` compiles
pub fn check(expr: &str) -> ExpressionResult<()> {
    let env = Environment::empty();
    env.compile_expression(expr)
        .map(|_| ())
        .map_err(|err| ExpressionError::Syntax {
            expr: expr.to_string(),
            message: err.to_string(),
        })
}

fn eval_raw(expr: &str, ctx: &Args) -> ExpressionResult<minijinja::Value> {
    let env = Environment::empty();
    let compiled = env
        .compile_expression(expr)
        .map_err(|err| ExpressionError::Syntax {
            expr: expr.to_string(),
            message: err.to_string(),
        })?;

    compiled.eval(ctx).map_err(|err| ExpressionError::Eval {
        expr: expr.to_string(),
        message: err.to_string(),
    })
}

/// Evaluate `expr` against `ctx` and convert the result to JSON
pub fn evaluate(expr: &str, ctx: &Args) -> ExpressionResult<Value> {
    let value = eval_raw(expr, ctx)?;
    if value.is_undefined() {
        return Err(ExpressionError::Undefined {
            expr: expr.to_string(),
        });
    }

    serde_json::to_value(&value).map_err(|err| ExpressionError::Eval {
        expr: expr.to_string(),
        message: err.to_string(),
    })
}

/// Evaluate `expr` for truthiness; undefined values are false
pub fn evaluate_bool(expr: &str, ctx: &Args) -> ExpressionResult<bool> {
    Ok(eval_raw(expr, ctx)?.is_true())
}

/// Evaluate `expr` to the sequence of items a loop walks over
///
/// Lists yield their elements and maps yield their keys.
pub fn evaluate_iterable(expr: &str, ctx: &Args) -> ExpressionResult<Vec<Value>> {
    match evaluate(expr, ctx)? {
        Value::Array(items) => Ok(items),
        Value::Object(map) => Ok(map.into_iter().map(|(k, _)| Value::String(k)).collect()),
        other => Err(ExpressionError::NotIterable {
            expr: expr.to_string(),
            kind: kind_name(&other),
        }),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

/// A `${...}` occurrence inside a string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placeholder<'a> {
    start: usize,
    end: usize,
    expr: &'a str,
}

/// Find every balanced `${...}` in `text`, left to right
fn placeholders(text: &str) -> Vec<Placeholder<'_>> {
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find("${") {
        let start = pos + offset;
        let mut depth = 0usize;
        let mut close = None;

        for (i, c) in text[start + 1..].char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(start + 1 + i);
                        break;
                    }
                }
                _ => {}
            }
        }

        let Some(close) = close else {
            break;
        };
        found.push(Placeholder {
            start,
            end: close + 1,
            expr: &text[start + 2..close],
        });
        pos = close + 1;
    }

    found
}

/// Whether `text` contains at least one `${...}` placeholder
pub fn has_placeholders(text: &str) -> bool {
    !placeholders(text).is_empty()
}

/// If `text` is exactly one placeholder, the expression inside it
pub fn sole_placeholder(text: &str) -> Option<&str> {
    let text = text.trim();
    match placeholders(text).as_slice() {
        [only] if only.start == 0 && only.end == text.len() => Some(only.expr.trim()),
        _ => None,
    }
}

/// Strip a surrounding `${...}` if present, for loop sources and conditions
pub fn unwrap_placeholder(text: &str) -> &str {
    sole_placeholder(text).unwrap_or_else(|| text.trim())
}

/// Names captured by placeholders, in order (used by textual patterns)
pub fn placeholder_names(text: &str) -> Vec<&str> {
    placeholders(text).iter().map(|p| p.expr.trim()).collect()
}

/// Split `text` around its placeholders, returning the literal parts
///
/// The result always has one more element than there are placeholders.
pub fn literal_parts(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut pos = 0;
    for p in placeholders(text) {
        parts.push(&text[pos..p.start]);
        pos = p.end;
    }
    parts.push(&text[pos..]);
    parts
}

/// Expand every placeholder in `text`
///
/// A string that is exactly one placeholder becomes the typed result; a
/// placeholder embedded in other text is replaced by its textual form. When
/// an expression fails or is undefined the placeholder is kept verbatim.
pub fn expand_str(text: &str, ctx: &Args) -> Value {
    let found = placeholders(text);
    if found.is_empty() {
        return Value::String(text.to_string());
    }

    if let [only] = found.as_slice() {
        if only.start == 0 && only.end == text.len() {
            return match evaluate(only.expr.trim(), ctx) {
                Ok(value) => value,
                Err(err) => {
                    trace!(error = %err, "leaving placeholder unexpanded");
                    Value::String(text.to_string())
                }
            };
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    for p in found {
        out.push_str(&text[pos..p.start]);
        match evaluate(p.expr.trim(), ctx) {
            Ok(Value::String(s)) => out.push_str(&s),
            Ok(value) => out.push_str(&value.to_string()),
            Err(err) => {
                trace!(error = %err, "leaving placeholder unexpanded");
                out.push_str(&text[p.start..p.end]);
            }
        }
        pos = p.end;
    }
    out.push_str(&text[pos..]);

    Value::String(out)
}

/// Recursively expand placeholders in every string inside `value`
pub fn expand_value(value: &Value, ctx: &Args) -> Value {
    match value {
        Value::String(s) => expand_str(s, ctx),
        Value::Array(items) => Value::Array(items.iter().map(|v| expand_value(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), expand_value(v, ctx)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

/// Expand placeholders in every argument value
pub fn expand_args(args: &Args, ctx: &Args) -> Args {
    args.iter()
        .map(|(k, v)| (k.clone(), expand_value(v, ctx)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> Args {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_evaluate_literals_and_lookups() {
        let ctx = ctx(json!({"event": {"args": {"message": "hi"}}, "n": 3}));
        assert_eq!(evaluate("[1, 2, 3]", &ctx).unwrap(), json!([1, 2, 3]));
        assert_eq!(evaluate("event.args.message", &ctx).unwrap(), json!("hi"));
        assert_eq!(evaluate("n * 2", &ctx).unwrap(), json!(6));
        assert_eq!(evaluate("n > 2 and n < 5", &ctx).unwrap(), json!(true));
    }

    #[test]
    fn test_undefined_is_an_error() {
        assert!(matches!(
            evaluate("missing", &Args::new()),
            Err(ExpressionError::Undefined { .. })
        ));
    }

    #[test]
    fn test_no_functions_or_filters_available() {
        assert!(evaluate("range(3)", &Args::new()).is_err());
        assert!(evaluate("'a' | upper", &Args::new()).is_err());
    }

    #[test]
    fn test_evaluate_bool_truthiness() {
        let ctx = ctx(json!({"empty": [], "word": "x"}));
        assert!(!evaluate_bool("empty", &ctx).unwrap());
        assert!(evaluate_bool("word", &ctx).unwrap());
        assert!(!evaluate_bool("missing", &ctx).unwrap());
    }

    #[test]
    fn test_evaluate_iterable() {
        let ctx = ctx(json!({"rooms": {"kitchen": 1, "hall": 2}}));
        assert_eq!(
            evaluate_iterable("rooms", &ctx).unwrap(),
            vec![json!("hall"), json!("kitchen")]
        );
        assert!(matches!(
            evaluate_iterable("5", &ctx),
            Err(ExpressionError::NotIterable { .. })
        ));
    }

    #[test]
    fn test_expand_sole_placeholder_keeps_type() {
        let ctx = ctx(json!({"level": 40, "list": [1, 2]}));
        assert_eq!(expand_str("${level}", &ctx), json!(40));
        assert_eq!(expand_str("${list}", &ctx), json!([1, 2]));
    }

    #[test]
    fn test_expand_embedded_placeholders_as_text() {
        let ctx = ctx(json!({"name": "kitchen", "level": 40}));
        assert_eq!(
            expand_str("set ${name} to ${level}%", &ctx),
            json!("set kitchen to 40%")
        );
    }

    #[test]
    fn test_failed_placeholder_is_left_verbatim() {
        let ctx = ctx(json!({"a": 1}));
        assert_eq!(expand_str("${nope}", &ctx), json!("${nope}"));
        assert_eq!(expand_str("a=${a} b=${b}", &ctx), json!("a=1 b=${b}"));
    }

    #[test]
    fn test_nested_braces_in_placeholder() {
        let ctx = Args::new();
        assert_eq!(expand_str("${ {'a': 1}['a'] }", &ctx), json!(1));
    }

    #[test]
    fn test_expand_value_recurses() {
        let ctx = ctx(json!({"x": "y"}));
        let value = json!({"outer": ["${x}", {"inner": "v-${x}"}], "n": 1});
        assert_eq!(
            expand_value(&value, &ctx),
            json!({"outer": ["y", {"inner": "v-y"}], "n": 1})
        );
    }

    #[test]
    fn test_pattern_parts() {
        let text = "turn on the ${room} lights";
        assert_eq!(placeholder_names(text), vec!["room"]);
        assert_eq!(literal_parts(text), vec!["turn on the ", " lights"]);
        assert_eq!(sole_placeholder(" ${ a + 1 } "), Some("a + 1"));
        assert_eq!(unwrap_placeholder("[1, 2]"), "[1, 2]");
    }
}
