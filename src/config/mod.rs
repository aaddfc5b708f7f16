//! Configuration management for vidrelay
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use vidrelay::config::Config;
//!
//! let config = Config::load(None).expect("Failed to load configuration");
//! println!("Downloading with: {}", config.fetch.downloader);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `VIDRELAY__<section>__<key>`
//!
//! Examples:
//! - `VIDRELAY__FETCH__TIMEOUT_SECS=120`
//! - `VIDRELAY__PUBLISH__PORT=auto`
//! - `VIDRELAY__PUBLISH__PUBLIC_HOST=media.example.net`
//!
//! The bot token is only read from `DISCORD_TOKEN`. `SERVE_PORT` and
//! `PUBLIC_HOST` are accepted as fallbacks for the publish settings.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/vidrelay.toml`.
//! This can be overridden using the `VIDRELAY_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{
    Config, DiscordConfig, FetchConfig, LogMode, LoggingConfig, PortSelection,
    PortSelectionError, PublishConfig,
};
pub use sources::default_path;
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("DISCORD_TOKEN is not set")]
    MissingToken,
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// `path` overrides `VIDRELAY_CONFIG` / `config/vidrelay.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or a value fails
    /// validation. A missing token is not an error here; see [`Config::discord_token`].
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path, without `.env` or secrets
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Bot token, required before connecting to the chat platform
    pub fn discord_token(&self) -> Result<&str, ConfigError> {
        self.discord
            .token
            .as_deref()
            .ok_or(ConfigError::MissingToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[publish]\nport = \"auto\"\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.publish.port, PortSelection::Auto);
    }

    #[test]
    fn test_validation_catches_bad_range() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[publish]
port_range_start = 9100
port_range_end = 9000
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::EmptyPortRange { .. })
        ));
    }

    #[test]
    fn test_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[publish]\nport = \"sometimes\"\n").unwrap();

        assert!(matches!(
            Config::load_from_path(config_path),
            Err(ConfigError::LoadError(_))
        ));
    }

    #[test]
    fn test_missing_token() {
        let config = Config::default();
        assert!(matches!(
            config.discord_token(),
            Err(ConfigError::MissingToken)
        ));

        let mut config = Config::default();
        config.discord.token = Some("abc.def".to_string());
        assert_eq!(config.discord_token().unwrap(), "abc.def");
    }
}
