//! Configuration for the `mqlc` binary
//!
//! Loaded from:
//! 1. a YAML file passed with `--config` (compile defaults, logging)
//! 2. a `.env` file in the working directory
//!
//! Environment variables always override values from the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
}

/// Compilation defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Cap on returned rows, 0 for none
    #[serde(default)]
    pub max_rows: u64,

    /// Schema description used when `--schema` is not given
    #[serde(default)]
    pub schema_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stderr, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
            output: "stderr".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub compile: CompileConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Defaults with environment variable overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = lookup("MQLC_MAX_ROWS") {
            self.compile.max_rows = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                var: "MQLC_MAX_ROWS".to_string(),
                value,
            })?;
        }
        if let Some(path) = lookup("MQLC_SCHEMA") {
            self.compile.schema_path = Some(PathBuf::from(path));
        }

        if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(output) = lookup("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.logging.directory = dir;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.compile.max_rows, 0);
        assert_eq!(config.compile.schema_path, None);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "compact");
        assert_eq!(config.logging.output, "stderr");
    }

    #[test]
    fn test_env_overrides() {
        let mut config: Config = serde_yaml::from_str(
            r#"
compile:
  max_rows: 500
  schema_path: "schema.yaml"
logging:
  level: "info"
"#,
        )
        .unwrap();
        assert_eq!(config.logging.format, "compact");

        config
            .apply_overrides(env(&[
                ("MQLC_MAX_ROWS", "1000"),
                ("MQLC_SCHEMA", "/etc/mqlc/shop.yaml"),
                ("LOG_FORMAT", "json"),
            ]))
            .unwrap();
        assert_eq!(config.compile.max_rows, 1000);
        assert_eq!(config.compile.schema_path, Some(PathBuf::from("/etc/mqlc/shop.yaml")));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_invalid_max_rows() {
        let mut config = Config::default();
        let err = config.apply_overrides(env(&[("MQLC_MAX_ROWS", "lots")])).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for MQLC_MAX_ROWS: lots");
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("mqlc_config_{}.yaml", std::process::id()));
        std::fs::write(&path, "compile:\n  max_rows: 25\n").unwrap();

        let config = Config::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        // MQLC_MAX_ROWS is not set by the test harness
        if std::env::var("MQLC_MAX_ROWS").is_err() {
            assert_eq!(config.compile.max_rows, 25);
        }
        assert!(matches!(
            Config::load(std::env::temp_dir().join("mqlc_missing.yaml")),
            Err(ConfigError::Io(_))
        ));
    }
}
