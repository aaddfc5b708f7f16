use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chat platform credentials
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DiscordConfig {
    /// Bot token (loaded from environment, not from config file)
    #[serde(skip)]
    pub token: Option<String>,
}

/// Downloader invocation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_downloader")]
    pub downloader: String,
    /// Directory receiving downloads; created at startup
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            downloader: default_downloader(),
            work_dir: default_work_dir(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_downloader() -> String {
    "yt-dlp".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_timeout_secs() -> u64 {
    300
}

/// Ephemeral file server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub port: PortSelection,
    #[serde(default = "default_port_range_start")]
    pub port_range_start: u16,
    #[serde(default = "default_port_range_end")]
    pub port_range_end: u16,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,
    /// Host placed in published links
    #[serde(default = "default_public_host")]
    pub public_host: String,
    /// Ask `ip_echo_url` for the external address at startup
    #[serde(default)]
    pub detect_public_host: bool,
    #[serde(default = "default_ip_echo_url")]
    pub ip_echo_url: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            port: PortSelection::Auto,
            port_range_start: default_port_range_start(),
            port_range_end: default_port_range_end(),
            bind_addr: default_bind_addr(),
            public_host: default_public_host(),
            detect_public_host: false,
            ip_echo_url: default_ip_echo_url(),
        }
    }
}

fn default_port_range_start() -> u16 {
    8000
}

fn default_port_range_end() -> u16 {
    8999
}

fn default_bind_addr() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_public_host() -> String {
    "localhost".to_string()
}

fn default_ip_echo_url() -> String {
    "https://api.ipify.org".to_string()
}

#[derive(Debug, Error)]
#[error("Invalid port selection '{0}', expected 'auto' or a port number")]
pub struct PortSelectionError(String);

/// First port tried by the publisher: random from the range, or a fixed number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortSelection {
    #[default]
    Auto,
    Fixed(u16),
}

impl FromStr for PortSelection {
    type Err = PortSelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(PortSelection::Auto);
        }
        s.parse::<u16>()
            .map(PortSelection::Fixed)
            .map_err(|_| PortSelectionError(s.to_string()))
    }
}

impl fmt::Display for PortSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSelection::Auto => f.write_str("auto"),
            PortSelection::Fixed(port) => write!(f, "{}", port),
        }
    }
}

impl Serialize for PortSelection {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            PortSelection::Auto => serializer.serialize_str("auto"),
            PortSelection::Fixed(port) => serializer.serialize_u16(*port),
        }
    }
}

impl<'de> Deserialize<'de> for PortSelection {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PortSelectionVisitor;

        impl<'de> serde::de::Visitor<'de> for PortSelectionVisitor {
            type Value = PortSelection;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("\"auto\" or a port number")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u16::try_from(v)
                    .map(PortSelection::Fixed)
                    .map_err(|_| E::custom(format!("port {} out of range", v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u16::try_from(v)
                    .map(PortSelection::Fixed)
                    .map_err(|_| E::custom(format!("port {} out of range", v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<PortSelection>().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(PortSelectionVisitor)
    }
}

/// Log output style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogMode {
    /// Timestamps, targets and every structured field
    #[default]
    Detailed,
    /// One compact line per event
    Minimal,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub mode: LogMode,
}
