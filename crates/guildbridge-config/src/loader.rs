//! Configuration loading with environment variable overrides.

use crate::schema::Config;
use crate::validator::{ConfigValidator, ValidationErrors};
use guildbridge_common::GuildBridgeError;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "GUILDBRIDGE_CONFIG_PATH";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error when reading configuration file
    #[error("Failed to read configuration file '{path}': {source}")]
    IoError {
        /// File that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// YAML parsing error
    #[error("Failed to parse YAML configuration: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation error
    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationErrors),

    /// Environment variable parsing error
    #[error("Failed to parse environment variable '{var}': {source}")]
    EnvParseError {
        /// Variable name
        var: String,
        /// Parse failure
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl From<ConfigError> for GuildBridgeError {
    fn from(err: ConfigError) -> Self {
        GuildBridgeError::config_with_source("Failed to load configuration", err)
    }
}

/// Configuration loader for the application
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file with environment variable overrides
    pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        Self::load_config_with(path, |key| env::var(key).ok())
    }

    /// Load a YAML file, resolving overrides through `lookup` instead of the
    /// process environment.
    pub fn load_config_with<P, F>(path: P, lookup: F) -> Result<Config, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content)?;

        Self::apply_overrides(&mut config, lookup)?;
        ConfigValidator::validate(&config)?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse YAML content. An empty document yields the defaults.
    pub fn parse(content: &str) -> Result<Config, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Resolve the configuration file and load it.
    ///
    /// Order: `GUILDBRIDGE_CONFIG_PATH`, then `config.yaml`, then
    /// `config.yml`, then built-in defaults. Environment overrides apply in
    /// every case.
    pub fn load() -> Result<Config, ConfigError> {
        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            return Self::load_config(config_path);
        }
        if let Some(path) = Self::discover(Path::new(".")) {
            return Self::load_config(path);
        }

        debug!("No configuration file found, using defaults");
        let mut config = Config::default();
        Self::apply_env_overrides(&mut config)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Find `config.yaml` or `config.yml` inside `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        ["config.yaml", "config.yml"]
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.exists())
    }

    /// Apply process environment overrides to configuration
    pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
        Self::apply_overrides(config, |key| env::var(key).ok())
    }

    /// Apply overrides resolved through `lookup`.
    pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("DISCORD_TOKEN") {
            config.discord.token = token;
        }

        if let Some(url) = lookup("DISCORD_API_BASE_URL") {
            config.discord.api_base_url = url;
        }

        if let Some(timeout) = lookup("DISCORD_TIMEOUT") {
            config.discord.request_timeout_seconds =
                timeout.trim().parse().map_err(|e| ConfigError::EnvParseError {
                    var: "DISCORD_TIMEOUT".to_string(),
                    source: Box::new(e),
                })?;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(interval) = lookup("TRANSFER_BATCH_INTERVAL") {
            config.transfer.batch_interval_seconds =
                interval.trim().parse().map_err(|e| ConfigError::EnvParseError {
                    var: "TRANSFER_BATCH_INTERVAL".to_string(),
                    source: Box::new(e),
                })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_config_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_load_partial_yaml_keeps_defaults() {
        let yaml = "discord:\n  token: \"abc.def\"\n  request_timeout_seconds: 30\ntransfer:\n  batch_size: 20\n";
        let file = create_test_config_file(yaml);

        let config = ConfigLoader::load_config_with(file.path(), no_env).unwrap();
        assert_eq!(config.discord.token, "abc.def");
        assert_eq!(config.discord.request_timeout_seconds, 30);
        assert_eq!(config.discord.api_base_url, "https://discord.com/api/v10");
        assert_eq!(config.transfer.batch_size, 20);
        assert_eq!(config.transfer.initial_batch_size, 25);
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let file = create_test_config_file("");
        let config = ConfigLoader::load_config_with(file.path(), no_env).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_yaml() {
        let file = create_test_config_file("discord:\n  token: [unclosed");
        let result = ConfigLoader::load_config_with(file.path(), no_env);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::load_config_with("/nonexistent/guildbridge.yaml", no_env);
        assert!(matches!(result, Err(ConfigError::IoError { .. })));
    }

    #[test]
    fn test_validation_error() {
        let file = create_test_config_file("discord:\n  api_base_url: \"not_a_url\"\n");
        let result = ConfigLoader::load_config_with(file.path(), no_env);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("DISCORD_TOKEN", "env-token"),
            ("DISCORD_API_BASE_URL", "http://localhost:9000/api"),
            ("DISCORD_TIMEOUT", "42"),
            ("LOG_LEVEL", "debug"),
            ("TRANSFER_BATCH_INTERVAL", "1"),
        ]
        .into_iter()
        .collect();
        let file = create_test_config_file("discord:\n  token: \"file-token\"\n");

        let config = ConfigLoader::load_config_with(file.path(), |key| {
            env.get(key).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(config.discord.token, "env-token");
        assert_eq!(config.discord.api_base_url, "http://localhost:9000/api");
        assert_eq!(config.discord.request_timeout_seconds, 42);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.transfer.batch_interval_seconds, 1);
    }

    #[test]
    fn test_invalid_environment_value() {
        let mut config = Config::default();
        let result = ConfigLoader::apply_overrides(&mut config, |key| {
            (key == "DISCORD_TIMEOUT").then(|| "soon".to_string())
        });

        match result {
            Err(ConfigError::EnvParseError { var, .. }) => assert_eq!(var, "DISCORD_TIMEOUT"),
            other => panic!("expected EnvParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_discover_prefers_yaml_extension() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ConfigLoader::discover(dir.path()).is_none());

        std::fs::write(dir.path().join("config.yml"), "").unwrap();
        assert_eq!(
            ConfigLoader::discover(dir.path()).unwrap(),
            dir.path().join("config.yml")
        );

        std::fs::write(dir.path().join("config.yaml"), "").unwrap();
        assert_eq!(
            ConfigLoader::discover(dir.path()).unwrap(),
            dir.path().join("config.yaml")
        );
    }
}
