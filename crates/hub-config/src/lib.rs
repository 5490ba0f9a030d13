//! YAML configuration for the hub
//!
//! Configuration files are plain YAML with three custom tags:
//!
//! - `!include path` - Inline another YAML file
//! - `!secret key` - Substitute from `secrets.yaml` next to the config
//! - `!env_var VAR` - Substitute an environment variable
//!
//! The resolved document is deserialized into a [`HubConfig`].
//!
//! # Example
//!
//! ```ignore
//! use hub_config::{resolve_config_path, HubConfig};
//!
//! let path = resolve_config_path(std::env::args().nth(1));
//! let config = HubConfig::load(&path)?;
//! ```

mod error;
mod hub_config;
mod loader;
mod secrets;

pub use error::{ConfigError, ConfigResult};
pub use hub_config::{
    resolve_config_path, BusBackend, BusConfig, CronConfig, CronjobConfig, EventHookConfig,
    ExecutorConfig, HubConfig, LoggingConfig, ProcedureConfig, CONFIG_PATH_ENV,
    DEFAULT_CONFIG_FILE,
};
pub use loader::{load_yaml, YamlLoader};
pub use secrets::Secrets;
