//! Admin console configuration loading from file and environment variables.

use fedreg_db::DbRuntimeSettings;
use fedreg_types::RegistryPolicy;
use serde::Deserialize;
use thiserror::Error;

/// Path used when neither `--config` nor `FEDREG_CONFIG_PATH` is given.
pub const DEFAULT_CONFIG_PATH: &str = "fedreg.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Entity states, types, metadata schemas and listing order.
    #[serde(default)]
    pub registry: RegistryPolicy,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "fedreg_entities=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_db_path() -> String {
    "fedreg.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    DbRuntimeSettings::default().busy_timeout_ms
}

fn default_pool_max_size() -> u32 {
    DbRuntimeSettings::default().pool_max_size
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl DatabaseConfig {
    pub fn runtime_settings(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults when the
/// file does not exist. The flag reports whether the file was found; logging
/// is not initialized yet, so the caller reports the fallback.
///
/// Environment variable overrides:
/// - `FEDREG_DB_PATH` overrides `database.path`
/// - `FEDREG_LOG_LEVEL` overrides `logging.level`
/// - `FEDREG_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `FEDREG_PRETTY_NAME` overrides `registry.pretty_name`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: &str) -> Result<(Config, bool), ConfigError> {
    let (mut config, found) = match read_config(path)? {
        Some(config) => (config, true),
        None => (Config::default(), false),
    };
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    Ok((config, found))
}

/// Parses the file at `path`, or `None` if it does not exist.
fn read_config(path: &str) -> Result<Option<Config>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(toml::from_str(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::FileRead(e)),
    }
}

fn apply_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(db_path) = var("FEDREG_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("FEDREG_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("FEDREG_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(field) = var("FEDREG_PRETTY_NAME") {
        config.registry.pretty_name = Some(field).filter(|f| !f.trim().is_empty());
    }
}
