//! Built-in actions available to every procedure

use std::sync::Arc;

use dashmap::DashMap;
use hub_bus::Bus;
use hub_core::{event_types, Args, Event, Response};
use hub_procedure::{ActionError, ActionRegistry};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

/// Process-wide variables shared by `variable.*` actions
pub type Variables = Arc<DashMap<String, Value>>;

/// Register `ping`, `variable.*`, `log.*` and `event.fire`
pub fn register_core_actions(registry: &ActionRegistry, bus: Arc<dyn Bus>, variables: Variables) {
    registry.register("ping", |_args: Args| async { Ok(Response::new("pong")) });

    let vars = variables.clone();
    registry.register("variable.set", move |args: Args| {
        let vars = vars.clone();
        async move {
            for (name, value) in &args {
                vars.insert(name.clone(), value.clone());
            }
            Ok(Response::new(Value::Object(args.into_iter().collect())))
        }
    });

    let vars = variables.clone();
    registry.register("variable.get", move |args: Args| {
        let vars = vars.clone();
        async move {
            let name = variable_name("variable.get", &args)?;
            let value = vars.get(&name).map(|v| v.clone()).unwrap_or(Value::Null);
            let mut output = Map::new();
            output.insert(name, value);
            Ok(Response::new(Value::Object(output)))
        }
    });

    let vars = variables;
    registry.register("variable.unset", move |args: Args| {
        let vars = vars.clone();
        async move {
            let name = variable_name("variable.unset", &args)?;
            let removed = vars.remove(&name).map(|(_, v)| v).unwrap_or(Value::Null);
            Ok(Response::new(removed))
        }
    });

    registry.register("log.info", |args: Args| async move {
        info!(target: "hub::log", "{}", log_message(&args));
        Ok(Response::default())
    });
    registry.register("log.warning", |args: Args| async move {
        warn!(target: "hub::log", "{}", log_message(&args));
        Ok(Response::default())
    });
    registry.register("log.error", |args: Args| async move {
        error!(target: "hub::log", "{}", log_message(&args));
        Ok(Response::default())
    });

    registry.register("event.fire", move |mut args: Args| {
        let bus = bus.clone();
        async move {
            let event_type = match args.shift_remove("type") {
                Some(Value::String(ty)) => ty,
                Some(other) => {
                    return Err(ActionError::failed(
                        "event.fire",
                        format!("event type must be a string, got {other}"),
                    ))
                }
                None => event_types::CUSTOM.to_string(),
            };

            let event = Event::new(event_type, args);
            let id = event.id().to_string();
            bus.post(event.into())
                .map_err(|err| ActionError::failed("event.fire", err))?;
            Ok(Response::new(serde_json::json!({ "id": id })))
        }
    });
}

fn variable_name(action: &str, args: &Args) -> Result<String, ActionError> {
    match args.get("name") {
        Some(Value::String(name)) if !name.is_empty() => Ok(name.clone()),
        _ => Err(ActionError::failed(action, "missing variable `name`")),
    }
}

fn log_message(args: &Args) -> String {
    match args.get("msg") {
        Some(Value::String(msg)) => msg.clone(),
        Some(other) => other.to_string(),
        None => serde_json::to_string(args).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_bus::LocalBus;
    use hub_procedure::ActionDispatcher;
    use serde_json::json;

    fn registry() -> (ActionRegistry, Variables) {
        let registry = ActionRegistry::new();
        let variables = Variables::default();
        register_core_actions(&registry, Arc::new(LocalBus::new("hub")), variables.clone());
        (registry, variables)
    }

    fn args(value: Value) -> Args {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_variables_round_trip() {
        let (registry, variables) = registry();

        let set = registry
            .dispatch("variable.set", args(json!({"mode": "away", "level": 3})))
            .await
            .unwrap();
        assert_eq!(set.output, json!({"mode": "away", "level": 3}));
        assert_eq!(variables.get("mode").map(|v| v.clone()), Some(json!("away")));

        let got = registry
            .dispatch("variable.get", args(json!({"name": "level"})))
            .await
            .unwrap();
        assert_eq!(got.output, json!({"level": 3}));

        registry
            .dispatch("variable.unset", args(json!({"name": "level"})))
            .await
            .unwrap();
        let gone = registry
            .dispatch("variable.get", args(json!({"name": "level"})))
            .await
            .unwrap();
        assert_eq!(gone.output, json!({"level": null}));
    }

    #[tokio::test]
    async fn test_variable_get_requires_name() {
        let (registry, _) = registry();
        let err = registry.dispatch("variable.get", Args::new()).await.unwrap_err();
        assert!(matches!(err, ActionError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_ping() {
        let (registry, _) = registry();
        let response = registry.dispatch("ping", Args::new()).await.unwrap();
        assert_eq!(response.output, json!("pong"));
    }

    #[tokio::test]
    async fn test_event_fire_rejects_non_string_type() {
        let (registry, _) = registry();
        let err = registry
            .dispatch("event.fire", args(json!({"type": 3})))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Failed { .. }));
    }
}
