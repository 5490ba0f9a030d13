//! Event conditions and match scoring
//!
//! A condition names an event type and a set of attribute constraints. The
//! type matches polymorphically (the type itself or any ancestor, by full or
//! short name). Each constraint is one of:
//!
//! - a non-textual value, compared for equality
//! - plain text, which must occur in the attribute's text
//! - text with `${name}` placeholders, matched case-insensitively with the
//!   literal parts in order and the placeholders captured into
//!   [`EventMatchResult::parsed_args`]
//!
//! Every satisfied constraint adds one point to the match score.

use hub_core::{Args, Event};
use hub_procedure::expression;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use tracing::trace;

use crate::error::{RuleError, RuleResult};

/// Outcome of matching one condition against one event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventMatchResult {
    pub is_match: bool,
    pub score: u32,
    /// Values captured by `${name}` placeholders in textual constraints
    pub parsed_args: Args,
}

/// A compiled `${name}` pattern
#[derive(Debug, Clone)]
pub struct TextPattern {
    source: String,
    names: Vec<String>,
    regex: Regex,
}

impl TextPattern {
    pub fn compile(source: &str) -> RuleResult<Self> {
        let names: Vec<String> = expression::placeholder_names(source)
            .into_iter()
            .map(str::to_string)
            .collect();
        let literals = expression::literal_parts(source);

        let mut re = String::from("(?i)");
        for (i, literal) in literals.iter().enumerate() {
            let words: Vec<String> = literal.split_whitespace().map(regex::escape).collect();
            re.push_str(&words.join(r"\s+"));
            if i < names.len() {
                // a trailing placeholder takes the rest of the text
                let last = i + 1 == names.len() && literals[i + 1].trim().is_empty();
                re.push_str(if last { r"\s*(.+)" } else { r"\s*(.+?)\s*" });
            }
        }

        let regex = Regex::new(&re).map_err(|err| RuleError::InvalidPattern {
            pattern: source.to_string(),
            source: err,
        })?;

        Ok(Self {
            source: source.to_string(),
            names,
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Match `text`, returning the captured values by placeholder name
    pub fn captures(&self, text: &str) -> Option<Args> {
        let caps = self.regex.captures(text)?;
        let mut parsed = Args::new();
        for (i, name) in self.names.iter().enumerate() {
            let value = caps.get(i + 1).map(|m| m.as_str().trim()).unwrap_or_default();
            parsed.insert(name.clone(), Value::String(value.to_string()));
        }
        Some(parsed)
    }
}

/// One attribute constraint
#[derive(Debug, Clone)]
pub enum Constraint {
    Equals(Value),
    Contains(String),
    Pattern(TextPattern),
}

impl Constraint {
    pub fn compile(value: Value) -> RuleResult<Self> {
        match value {
            Value::String(text) if expression::has_placeholders(&text) => {
                Ok(Self::Pattern(TextPattern::compile(&text)?))
            }
            Value::String(text) => Ok(Self::Contains(text)),
            other => Ok(Self::Equals(other)),
        }
    }

    /// Check `actual`, collecting captures into `parsed`
    fn check(&self, actual: &Value, parsed: &mut Args) -> bool {
        match self {
            Self::Equals(expected) => values_equal(actual, expected),
            Self::Contains(needle) => attribute_text(actual).contains(needle.as_str()),
            Self::Pattern(pattern) => match pattern.captures(&attribute_text(actual)) {
                Some(captured) => {
                    parsed.extend(captured);
                    true
                }
                None => false,
            },
        }
    }
}

/// JSON equality, except that numbers compare by value (`21 == 21.0`)
fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => actual == expected,
    }
}

fn attribute_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Event type plus attribute constraints
#[derive(Debug, Clone)]
pub struct EventCondition {
    event_type: String,
    constraints: IndexMap<String, Constraint>,
}

impl EventCondition {
    /// Condition on the event type alone
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            constraints: IndexMap::new(),
        }
    }

    /// Add a constraint on attribute `key`
    pub fn with_constraint(mut self, key: impl Into<String>, value: Value) -> RuleResult<Self> {
        self.constraints.insert(key.into(), Constraint::compile(value)?);
        Ok(self)
    }

    /// Build from a mapping with a `type` key and attribute constraints
    pub fn from_config(config: &Value) -> RuleResult<Self> {
        let Value::Object(map) = config else {
            return Err(RuleError::InvalidCondition(format!(
                "expected a mapping, got {config}"
            )));
        };

        let event_type = match map.get("type") {
            Some(Value::String(ty)) if !ty.trim().is_empty() => ty.trim().to_string(),
            Some(other) => {
                return Err(RuleError::InvalidCondition(format!(
                    "event type must be a string, got {other}"
                )))
            }
            None => {
                return Err(RuleError::InvalidCondition(
                    "missing event `type`".to_string(),
                ))
            }
        };

        let mut condition = Self::new(event_type);
        for (key, value) in map.iter().filter(|(key, _)| key.as_str() != "type") {
            condition = condition.with_constraint(key.clone(), value.clone())?;
        }
        Ok(condition)
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn constraints(&self) -> impl Iterator<Item = (&str, &Constraint)> {
        self.constraints.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Match `event` against this condition
    pub fn matches(&self, event: &Event) -> EventMatchResult {
        if !event.event_type().is_a(&self.event_type) {
            trace!(
                expected = %self.event_type,
                actual = %event.event_type(),
                "Event type doesn't match"
            );
            return EventMatchResult::default();
        }

        let mut result = EventMatchResult {
            is_match: true,
            ..Default::default()
        };
        for (key, constraint) in &self.constraints {
            let satisfied = event
                .get(key)
                .is_some_and(|actual| constraint.check(actual, &mut result.parsed_args));
            if !satisfied {
                trace!(attribute = %key, "Event attribute doesn't match");
                return EventMatchResult::default();
            }
            result.score += 1;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::event_types;
    use serde_json::json;

    fn speech(phrase: &str) -> Event {
        let mut args = Args::new();
        args.insert("phrase".to_string(), json!(phrase));
        Event::new(event_types::SPEECH_RECOGNIZED, args)
    }

    #[test]
    fn test_ping_matches_with_score_one() {
        let condition =
            EventCondition::from_config(&json!({"type": "PingEvent", "message": "ping"})).unwrap();
        let result = condition.matches(&Event::ping("ping"));
        assert!(result.is_match);
        assert_eq!(result.score, 1);
        assert!(result.parsed_args.is_empty());
    }

    #[test]
    fn test_type_mismatch_never_matches() {
        let condition =
            EventCondition::from_config(&json!({"type": event_types::SENSOR_DATA_CHANGE}))
                .unwrap();
        let result = condition.matches(&Event::ping("ping"));
        assert!(!result.is_match);
        assert_eq!(result.score, 0);
    }

    #[test]
    fn test_ancestor_type_matches() {
        let condition = EventCondition::from_config(&json!({"type": "AssistantEvent"})).unwrap();
        let result = condition.matches(&speech("hello"));
        assert!(result.is_match);
        assert_eq!(result.score, 0);
    }

    #[test]
    fn test_substring_constraint() {
        let condition = EventCondition::new("PingEvent")
            .with_constraint("message", json!("ell"))
            .unwrap();
        assert!(condition.matches(&Event::ping("hello")).is_match);
        assert!(!condition.matches(&Event::ping("goodbye")).is_match);
    }

    #[test]
    fn test_missing_attribute_fails() {
        let condition = EventCondition::new("Event")
            .with_constraint("phrase", json!("on"))
            .unwrap();
        assert!(!condition.matches(&Event::ping("on")).is_match);
    }

    #[test]
    fn test_non_textual_constraint_uses_equality() {
        let mut args = Args::new();
        args.insert("temperature".to_string(), json!(21));
        let event = Event::new(event_types::SENSOR_DATA_CHANGE, args);

        let hit = EventCondition::new("SensorDataChangeEvent")
            .with_constraint("temperature", json!(21))
            .unwrap();
        let miss = EventCondition::new("SensorDataChangeEvent")
            .with_constraint("temperature", json!(22))
            .unwrap();
        assert!(hit.matches(&event).is_match);
        assert!(!miss.matches(&event).is_match);
    }

    #[test]
    fn test_integer_constraint_matches_float_reading() {
        let mut args = Args::new();
        args.insert("temperature".to_string(), json!(21.0));
        let event = Event::new(event_types::SENSOR_DATA_CHANGE, args);

        let condition = EventCondition::new("SensorDataChangeEvent")
            .with_constraint("temperature", json!(21))
            .unwrap();
        let result = condition.matches(&event);
        assert!(result.is_match);
        assert_eq!(result.score, 1);

        let other = EventCondition::new("SensorDataChangeEvent")
            .with_constraint("temperature", json!(21.5))
            .unwrap();
        assert!(!other.matches(&event).is_match);
    }

    #[test]
    fn test_pattern_captures_placeholders() {
        let condition = EventCondition::from_config(&json!({
            "type": "SpeechRecognizedEvent",
            "phrase": "turn on the ${room} lights"
        }))
        .unwrap();

        let result = condition.matches(&speech("Please Turn On the kitchen lights now"));
        assert!(result.is_match);
        assert_eq!(result.score, 1);
        assert_eq!(result.parsed_args.get("room"), Some(&json!("kitchen")));
    }

    #[test]
    fn test_pattern_trailing_placeholder_takes_rest() {
        let pattern = TextPattern::compile("play ${song}").unwrap();
        let captured = pattern.captures("play the white album").unwrap();
        assert_eq!(captured.get("song"), Some(&json!("the white album")));
    }

    #[test]
    fn test_pattern_requires_literals_in_order() {
        let pattern = TextPattern::compile("turn ${state} the ${room} lights").unwrap();
        assert!(pattern.captures("lights the kitchen turn off").is_none());

        let captured = pattern.captures("turn off the living room lights").unwrap();
        assert_eq!(captured.get("state"), Some(&json!("off")));
        assert_eq!(captured.get("room"), Some(&json!("living room")));
    }

    #[test]
    fn test_missing_type_is_rejected() {
        let err = EventCondition::from_config(&json!({"message": "ping"})).unwrap_err();
        assert!(matches!(err, RuleError::InvalidCondition(_)));
    }
}
