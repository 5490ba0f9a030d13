//! YAML loader resolving the hub's custom tags
//!
//! - `!include path` inlines another YAML file, relative to the including file
//! - `!secret key` substitutes a value from `secrets.yaml`
//! - `!env_var VAR` substitutes an environment variable

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::value::TaggedValue;
use serde_yaml::Value;
use tracing::{debug, trace};

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;

pub struct YamlLoader {
    config_dir: PathBuf,
    secrets: Secrets,
    /// Files currently being loaded, outermost first
    include_stack: Vec<PathBuf>,
}

impl YamlLoader {
    /// Loader rooted at `config_dir`, reading `secrets.yaml` from it
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;
        Ok(Self::with_secrets(config_dir, secrets))
    }

    pub fn with_secrets(config_dir: impl Into<PathBuf>, secrets: Secrets) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets,
            include_stack: Vec::new(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn secrets(&self) -> &Secrets {
        &self.secrets
    }

    /// Load a file, resolving tags; an empty file is `null`
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = if path.as_ref().is_absolute() {
            path.as_ref().to_path_buf()
        } else {
            self.config_dir.join(path)
        };

        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        debug!(path = %path.display(), "Loading YAML file");
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
            path: path.clone(),
            source,
        })?;

        self.include_stack.push(path.clone());
        let result = self.load_str(&content, &path);
        self.include_stack.pop();
        result
    }

    /// Parse `content` as if it were read from `source`
    pub fn load_str(&mut self, content: &str, source: &Path) -> ConfigResult<Value> {
        if content.trim().is_empty() {
            return Ok(Value::Null);
        }

        let value: Value = serde_yaml::from_str(content).map_err(|err| ConfigError::ParseYaml {
            path: source.to_path_buf(),
            source: err,
        })?;
        self.resolve(value, source)
    }

    fn resolve(&mut self, value: Value, source: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.resolve_tag(*tagged, source),
            Value::Mapping(map) => {
                let mut resolved = serde_yaml::Mapping::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key, self.resolve(value, source)?);
                }
                Ok(Value::Mapping(resolved))
            }
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| self.resolve(item, source))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            scalar => Ok(scalar),
        }
    }

    fn resolve_tag(&mut self, tagged: TaggedValue, source: &Path) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!(tag = %tag, "Resolving tag");

        match tag.as_str() {
            "!include" => {
                let target = self.include_path(&tagged.value, source)?;
                self.load_file(target)
            }
            "!secret" => {
                let key = tag_argument(&tag, &tagged.value)?;
                Ok(Value::String(self.secrets.get(key)?.to_string()))
            }
            "!env_var" => {
                let var = tag_argument(&tag, &tagged.value)?;
                std::env::var(var)
                    .map(Value::String)
                    .map_err(|_| ConfigError::EnvVarNotFound {
                        var: var.to_string(),
                    })
            }
            _ => {
                let value = self.resolve(tagged.value, source)?;
                Ok(Value::Tagged(Box::new(TaggedValue {
                    tag: tagged.tag,
                    value,
                })))
            }
        }
    }

    fn include_path(&self, value: &Value, source: &Path) -> ConfigResult<PathBuf> {
        let Value::String(raw) = value else {
            return Err(ConfigError::InvalidIncludePath {
                path: format!("{value:?}"),
                reason: "path must be a string".to_string(),
            });
        };

        let raw = Path::new(raw.trim());
        if raw.is_absolute() {
            return Ok(raw.to_path_buf());
        }
        let base = source
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(&self.config_dir);
        Ok(base.join(raw))
    }
}

fn tag_argument<'a>(tag: &str, value: &'a Value) -> ConfigResult<&'a str> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim()),
        _ => Err(ConfigError::InvalidValue {
            key: tag.to_string(),
            reason: "expected a non-empty string".to_string(),
        }),
    }
}

/// Load `file` from `config_dir` with full tag resolution
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir)?.load_file(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn get<'a>(value: &'a Value, key: &str) -> &'a Value {
        value.get(key).unwrap_or_else(|| panic!("missing key {key}"))
    }

    #[test]
    fn test_include_relative_to_including_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "hooks/lights.yaml", "extra: !include ../extra.yaml\n");
        write(dir.path(), "extra.yaml", "answer: 42\n");
        write(dir.path(), "config.yaml", "hooks: !include hooks/lights.yaml\n");

        let value = load_yaml(dir.path(), "config.yaml").unwrap();
        let extra = get(get(&value, "hooks"), "extra");
        assert_eq!(get(extra, "answer"), &Value::from(42));
    }

    #[test]
    fn test_secret_substitution() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "secrets.yaml", "hub_token: abc123\n");
        write(dir.path(), "config.yaml", "token: !secret hub_token\n");

        let value = load_yaml(dir.path(), "config.yaml").unwrap();
        assert_eq!(get(&value, "token"), &Value::from("abc123"));
    }

    #[test]
    fn test_missing_secret() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "config.yaml", "token: !secret nope\n");

        let result = load_yaml(dir.path(), "config.yaml");
        assert!(matches!(result, Err(ConfigError::SecretNotFound { .. })));
    }

    #[test]
    fn test_env_var() {
        let dir = TempDir::new().unwrap();
        std::env::set_var("HUB_CONFIG_TEST_BROKER", "broker.lan");
        write(dir.path(), "config.yaml", "host: !env_var HUB_CONFIG_TEST_BROKER\n");

        let value = load_yaml(dir.path(), "config.yaml").unwrap();
        assert_eq!(get(&value, "host"), &Value::from("broker.lan"));
        std::env::remove_var("HUB_CONFIG_TEST_BROKER");
    }

    #[test]
    fn test_missing_env_var() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "config.yaml", "host: !env_var HUB_CONFIG_TEST_UNSET_VAR\n");

        let result = load_yaml(dir.path(), "config.yaml");
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound { var }) if var == "HUB_CONFIG_TEST_UNSET_VAR"));
    }

    #[test]
    fn test_circular_include() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.yaml", "b: !include b.yaml\n");
        write(dir.path(), "b.yaml", "a: !include a.yaml\n");

        let result = load_yaml(dir.path(), "a.yaml");
        assert!(matches!(result, Err(ConfigError::CircularInclude { .. })));
    }

    #[test]
    fn test_unknown_tag_is_kept() {
        let mut loader = YamlLoader::with_secrets("/tmp", Secrets::default());
        let value = loader
            .load_str("value: !custom thing\n", Path::new("inline.yaml"))
            .unwrap();
        assert!(matches!(get(&value, "value"), Value::Tagged(_)));
    }

    #[test]
    fn test_empty_file_is_null() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "config.yaml", "\n");
        assert_eq!(load_yaml(dir.path(), "config.yaml").unwrap(), Value::Null);
    }
}
