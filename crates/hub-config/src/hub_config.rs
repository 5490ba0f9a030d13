//! Typed hub configuration
//!
//! ```yaml
//! device_id: living-room
//! token: !secret hub_token
//! logging:
//!   filter: info
//! bus:
//!   backend: mqtt
//!   host: localhost
//! executor:
//!   n_tries: 2
//! procedures:
//!   lights_on:
//!     args: [room]
//!     actions:
//!       - action: light.on
//!         args: { room: "${room}" }
//! event_hooks:
//!   on_ping:
//!     if: { type: PingEvent, message: ping }
//!     then:
//!       - action: procedure.lights_on
//!         args: { room: hall }
//! cronjobs:
//!   every_minute:
//!     cron_expression: "* * * * *"
//!     actions:
//!       - action: log.info
//!         args: { msg: tick }
//! ```

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::YamlLoader;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "HUB_CONFIG";

/// Config file used when neither a CLI argument nor `HUB_CONFIG` is given
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Pick the config path: CLI argument, then `HUB_CONFIG`, then `config.yaml`
pub fn resolve_config_path(cli_arg: Option<String>) -> PathBuf {
    cli_arg
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .filter(|p| !p.trim().is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Identity of this node on the bus
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// When set, incoming requests must carry this token
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub cron: CronConfig,

    #[serde(default)]
    pub procedures: IndexMap<String, ProcedureConfig>,

    #[serde(default)]
    pub event_hooks: IndexMap<String, EventHookConfig>,

    #[serde(default)]
    pub cronjobs: IndexMap<String, CronjobConfig>,
}

fn default_device_id() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            token: None,
            logging: LoggingConfig::default(),
            bus: BusConfig::default(),
            executor: ExecutorConfig::default(),
            cron: CronConfig::default(),
            procedures: IndexMap::new(),
            event_hooks: IndexMap::new(),
            cronjobs: IndexMap::new(),
        }
    }
}

impl HubConfig {
    /// Load and validate the config file at `path`
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let config_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut loader = YamlLoader::new(config_dir)?;
        let value = loader.load_file(path.file_name().map_or(path, Path::new))?;
        Self::from_yaml_value(value, path)
    }

    /// Parse and validate config text, resolving tags against `config_dir`
    pub fn from_yaml_str(content: &str, config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let mut loader = YamlLoader::new(config_dir)?;
        let source = loader.config_dir().join(DEFAULT_CONFIG_FILE);
        let value = loader.load_str(content, &source)?;
        Self::from_yaml_value(value, &source)
    }

    fn from_yaml_value(value: serde_yaml::Value, path: &Path) -> ConfigResult<Self> {
        let config: Self = if value.is_null() {
            Self::default()
        } else {
            serde_yaml::from_value(value).map_err(|source| ConfigError::Schema {
                path: path.to_path_buf(),
                source,
            })?
        };

        config.validate()?;
        debug!(
            device_id = %config.device_id,
            procedures = config.procedures.len(),
            event_hooks = config.event_hooks.len(),
            cronjobs = config.cronjobs.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |key: &str, reason: &str| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: reason.to_string(),
            })
        };

        if self.device_id.trim().is_empty() {
            return invalid("device_id", "must not be empty");
        }
        if self.executor.n_tries == 0 {
            return invalid("executor.n_tries", "must be at least 1");
        }
        if self.cron.tick_interval_ms == 0 {
            return invalid("cron.tick_interval_ms", "must be greater than 0");
        }
        if self.bus.backend == BusBackend::Mqtt && self.bus.host.trim().is_empty() {
            return invalid("bus.host", "must not be empty");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    #[default]
    Mqtt,
    Local,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub backend: BusBackend,
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub base_topic: String,
    pub keep_alive_secs: u64,
    pub reconnect_backoff_ms: u64,
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            host: "localhost".to_string(),
            port: 1883,
            client_id: "hubd".to_string(),
            base_topic: "hub".to_string(),
            keep_alive_secs: 30,
            reconnect_backoff_ms: 1000,
            capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Attempts per failing request unless a step overrides it
    pub n_tries: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { n_tries: 1 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CronConfig {
    pub tick_interval_ms: u64,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
        }
    }
}

/// A named procedure: either a bare step list or a full declaration
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProcedureConfig {
    Steps(Vec<Value>),
    Declared {
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        concurrent: bool,
        #[serde(deserialize_with = "one_or_many")]
        actions: Vec<Value>,
    },
}

impl ProcedureConfig {
    pub fn args(&self) -> &[String] {
        match self {
            Self::Steps(_) => &[],
            Self::Declared { args, .. } => args,
        }
    }

    pub fn concurrent(&self) -> bool {
        matches!(self, Self::Declared { concurrent: true, .. })
    }

    pub fn actions(&self) -> &[Value] {
        match self {
            Self::Steps(actions) | Self::Declared { actions, .. } => actions,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventHookConfig {
    /// Condition mapping: `type` plus attribute constraints
    #[serde(rename = "if")]
    pub condition: Value,

    #[serde(rename = "then", deserialize_with = "one_or_many")]
    pub actions: Vec<Value>,

    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CronjobConfig {
    pub cron_expression: String,

    #[serde(deserialize_with = "one_or_many")]
    pub actions: Vec<Value>,
}

/// Accept a single step mapping where a list of steps is expected
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    })
}
