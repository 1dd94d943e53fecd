//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration only: database path, port, logging. Priority
//! order is command line, then environment, then TOML config file, then
//! OS-dependent defaults. Runtime behavior is not configured here.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default HTTP/WS port for the scheduling service
pub const DEFAULT_PORT: u16 = 5730;

/// Environment variable overriding the root data folder
pub const ROOT_FOLDER_ENV: &str = "BANDHALL_ROOT_FOLDER";

/// Bootstrap configuration from TOML file
///
/// These settings cannot change during runtime; restart to pick up
/// changes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file (relative or absolute)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_path: Option<PathBuf>,
    pub port: Option<u16>,
    pub root_folder: Option<PathBuf>,
}

/// Resolved application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub port: u16,
    pub log_level: String,
}

impl Config {
    /// Resolve configuration from an optional TOML file plus overrides.
    ///
    /// Zero-config startup: a missing config file is not an error, all
    /// values have built-in defaults.
    pub fn load(config_path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let toml_config = match config_path {
            Some(path) => load_toml(path)?,
            None => {
                let default_path = resolve_root_folder(overrides.root_folder.as_deref())
                    .join("config.toml");
                if default_path.exists() {
                    load_toml(&default_path)?
                } else {
                    TomlConfig::default()
                }
            }
        };

        let root_folder = resolve_root_folder(overrides.root_folder.as_deref());
        let database_path = overrides
            .database_path
            .or(toml_config.database_path)
            .unwrap_or_else(|| root_folder.join("bandhall.db"));
        let port = overrides.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);

        Ok(Config {
            database_path,
            port,
            log_level: toml_config.logging.level,
        })
    }
}

fn load_toml(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("failed to parse config file {:?}: {}", path, e)))
}

/// Root data folder, priority: CLI argument, environment variable,
/// OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        return PathBuf::from(path);
    }
    default_root_folder()
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("bandhall"))
        .unwrap_or_else(|| PathBuf::from("./bandhall_data"))
}
