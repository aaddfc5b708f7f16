//! Ephemeral single-file HTTP publication
//!
//! Each published file gets its own listener on a port from the configured
//! range. Servers run as independent tasks and are tracked in the
//! [`ServerRegistry`] until the retention scheduler tears them down.

mod host;
mod registry;
mod responder;

pub use host::detect_public_host;
pub use registry::{ServerHandle, ServerRegistry};
pub use responder::{content_type_for, router};

use crate::config::{PortSelection, PublishConfig};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

/// Bind attempts before a publication is abandoned
pub const PUBLISH_BIND_ATTEMPTS: usize = 10;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("No free port after {attempts} bind attempts (last error: {last_error})")]
    BindExhausted { attempts: usize, last_error: String },

    #[error("Path has no file name: {0}")]
    NoFileName(PathBuf),

    #[error("File not publishable: {0}")]
    Unreadable(#[from] std::io::Error),

    #[error("Cannot build link for host '{host}': {reason}")]
    InvalidLink { host: String, reason: String },
}

/// A file reachable over HTTP until `expires_at`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFile {
    pub path: PathBuf,
    pub port: u16,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Binds per-file HTTP servers and registers them
#[derive(Debug, Clone)]
pub struct EphemeralPublisher {
    registry: ServerRegistry,
    bind_ip: IpAddr,
    public_host: String,
    port: PortSelection,
    port_range: RangeInclusive<u16>,
}

impl EphemeralPublisher {
    pub fn new(config: &PublishConfig, registry: ServerRegistry) -> Self {
        Self {
            registry,
            bind_ip: config.bind_addr,
            public_host: config.public_host.clone(),
            port: config.port,
            port_range: config.port_range_start..=config.port_range_end,
        }
    }

    /// Replace the host used in links (e.g. after public address detection)
    pub fn with_public_host(mut self, host: impl Into<String>) -> Self {
        self.public_host = host.into();
        self
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    pub fn public_host(&self) -> &str {
        &self.public_host
    }

    /// Start serving `path` and return its link.
    ///
    /// The first port comes from the configured selection; each retry draws a
    /// fresh random port from the range. On error nothing is registered and the
    /// file is left for the caller to delete.
    pub async fn publish(&self, path: &Path, retention: Duration) -> Result<PublishedFile, PublishError> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| PublishError::NoFileName(path.to_path_buf()))?;
        tokio::fs::metadata(path).await?;

        let (listener, port) = self.bind().await?;

        let url = link(&self.public_host, port, &filename)?;

        let id = self.registry.next_id();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(path.to_path_buf());
        let registry = self.registry.clone();

        self.registry
            .spawn_registered(port, id, path.to_path_buf(), shutdown_tx, move || {
                tokio::spawn(async move {
                    let result = axum::serve(listener, app.into_make_service())
                        .with_graceful_shutdown(async {
                            let _ = shutdown_rx.await;
                        })
                        .await;
                    if let Err(e) = result {
                        warn!(port, error = %e, "File server stopped with error");
                    }
                    registry.forget(port, id);
                })
            });
        let expires_at = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        info!(%url, port, "File server started");

        Ok(PublishedFile {
            path: path.to_path_buf(),
            port,
            url,
            expires_at,
        })
    }

    async fn bind(&self) -> Result<(TcpListener, u16), PublishError> {
        let mut port = match self.port {
            PortSelection::Fixed(port) => port,
            PortSelection::Auto => self.random_port(),
        };
        let mut last_error = String::new();

        for attempt in 1..=PUBLISH_BIND_ATTEMPTS {
            match TcpListener::bind(SocketAddr::new(self.bind_ip, port)).await {
                Ok(listener) => {
                    debug!(port, attempt, "Bound file server");
                    return Ok((listener, port));
                }
                Err(e) => {
                    warn!(port, attempt, error = %e, "Port unavailable, retrying");
                    last_error = e.to_string();
                    port = self.random_port();
                }
            }
        }

        Err(PublishError::BindExhausted {
            attempts: PUBLISH_BIND_ATTEMPTS,
            last_error,
        })
    }

    fn random_port(&self) -> u16 {
        rand::rng().random_range(self.port_range.clone())
    }
}

/// `http://host:port/<filename>` with the filename percent-encoded and IPv6
/// hosts bracketed
fn link(host: &str, port: u16, filename: &str) -> Result<String, PublishError> {
    let invalid = |reason: String| PublishError::InvalidLink {
        host: host.to_string(),
        reason,
    };

    let authority = match host.parse::<Ipv6Addr>() {
        Ok(ip) => format!("[{}]", ip),
        Err(_) => host.to_string(),
    };
    let mut url = Url::parse(&format!("http://{}:{}/", authority, port))
        .map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("URL cannot carry a path".to_string()))?
        .pop_if_empty()
        .push(filename);

    Ok(url.into())
}
