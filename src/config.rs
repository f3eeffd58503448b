//! Console configuration
//!
//! Handles parsing and discovery of `console.toml` files. Configuration
//! only feeds the extension surface: where bare library names are searched
//! and which libraries the console loads at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching `console.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConsoleConfig {
    /// Extension loading configuration
    #[serde(default)]
    pub extensions: ExtensionsConfig,
}

/// `[extensions]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExtensionsConfig {
    /// Directories searched when a bare library name is loaded
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Libraries loaded when the console starts
    #[serde(default)]
    pub preload: Vec<String>,
}

impl ConsoleConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: ConsoleConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join("console.toml");
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                return Err(ConfigError::NotFound(format!(
                    "no console.toml found from {}",
                    start_dir.display()
                )));
            }
        }
    }

    /// Load configuration from the working directory or its parents,
    /// falling back to the defaults when none exists.
    pub fn load_or_default() -> Self {
        std::env::current_dir()
            .ok()
            .and_then(|cwd| Self::find_and_load(&cwd).ok())
            .unwrap_or_default()
    }
}
