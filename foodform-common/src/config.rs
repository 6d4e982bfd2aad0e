//! Bootstrap configuration loading
//!
//! Configuration file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `FOODFORM_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/foodform/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing configuration file never stops startup: a warning is logged and
//! the compiled defaults are used. A file that exists but cannot be parsed is
//! a configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "FOODFORM_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Reconciliation engine settings (optional)
    #[serde(default)]
    pub engine: EngineSettings,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// What to do with an image whose scan finished but produced no usable text
///
/// Barcode removal prunes images that have neither a scan result nor any
/// remaining barcode. A scan result with zero regions sits in between, so the
/// behaviour is a policy choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyScanPolicy {
    /// Treat an empty scan result like any other scan result (image is kept)
    #[default]
    Keep,
    /// Treat an empty scan result like a missing one (image may be pruned)
    Prune,
}

/// Reconciliation engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Handling of images whose scan yielded no text regions
    #[serde(default)]
    pub empty_scan_policy: EmptyScanPolicy,

    /// Session event bus capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Session actor command queue capacity
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            empty_scan_policy: EmptyScanPolicy::default(),
            event_capacity: default_event_capacity(),
            command_capacity: default_command_capacity(),
        }
    }
}

impl EngineSettings {
    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::Config("engine.event_capacity must be > 0".to_string()));
        }
        if self.command_capacity == 0 {
            return Err(Error::Config("engine.command_capacity must be > 0".to_string()));
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_event_capacity() -> usize {
    100
}

fn default_command_capacity() -> usize {
    32
}

/// Resolves which configuration file to load
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
    env_var_name: String,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self {
            cli_path: None,
            env_var_name: CONFIG_ENV_VAR.to_string(),
        }
    }

    /// Use a path given on the command line (highest priority)
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Override the environment variable consulted (tests use this)
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var_name = name.into();
        self
    }

    /// Configuration file path by priority, `None` when nothing applies
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        if let Ok(path) = std::env::var(&self.env_var_name) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        default_config_path()
    }

    /// Load configuration, falling back to compiled defaults
    pub fn load(&self) -> Result<TomlConfig> {
        let Some(path) = self.config_path() else {
            info!("No configuration file location available, using defaults");
            return Ok(TomlConfig::default());
        };

        if !path.exists() {
            warn!(
                path = %path.display(),
                "Configuration file not found, using defaults"
            );
            return Ok(TomlConfig::default());
        }

        load_from_path(&path)
    }
}

/// Parse and validate a configuration file
pub fn load_from_path(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)?;
    config.engine.validate()?;

    info!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

/// Platform configuration file (`~/.config/foodform/config.toml` on Linux)
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("foodform").join("config.toml"))
}
