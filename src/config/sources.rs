use super::models::{Config, PortSelection};
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "VIDRELAY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/vidrelay.toml";
const ENV_PREFIX: &str = "VIDRELAY";
const ENV_SEPARATOR: &str = "__";

/// Path used when no explicit config file is given
pub fn default_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load(config_path: Option<PathBuf>) -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = config_path.unwrap_or_else(default_path);
    let mut config = load_from_sources(config_path)?;

    load_secrets(&mut config);
    load_legacy_env(&mut config)?;

    Ok(config)
}

/// Secrets are never stored in TOML files, only in environment
fn load_secrets(config: &mut Config) {
    if let Ok(token) = env::var("DISCORD_TOKEN") {
        let token = token.trim();
        if !token.is_empty() {
            config.discord.token = Some(token.to_string());
        }
    }
}

/// Older deployments configure the publisher with flat variable names
fn load_legacy_env(config: &mut Config) -> Result<(), ConfigError> {
    if env::var(format!("{ENV_PREFIX}{ENV_SEPARATOR}PUBLISH{ENV_SEPARATOR}PORT")).is_err() {
        if let Ok(port) = env::var("SERVE_PORT") {
            config.publish.port = port
                .parse::<PortSelection>()
                .map_err(|e| ConfigError::Message(e.to_string()))?;
        }
    }

    if env::var(format!("{ENV_PREFIX}{ENV_SEPARATOR}PUBLISH{ENV_SEPARATOR}PUBLIC_HOST")).is_err() {
        if let Ok(host) = env::var("PUBLIC_HOST") {
            if !host.trim().is_empty() {
                config.publish.public_host = host.trim().to_string();
            }
        }
    }

    Ok(())
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // VIDRELAY__PUBLISH__PUBLIC_HOST -> publish.public_host
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
