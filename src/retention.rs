//! Delayed teardown of published files and their servers

use crate::publish::ServerRegistry;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// How long a published file stays reachable
pub const FILE_RETENTION: Duration = Duration::from_secs(3600);

/// Owns one teardown task per publication.
///
/// Tasks never touch the single-flight gate. On [`RetentionScheduler::shutdown`]
/// pending delays are cut short so every teardown runs before the process exits.
#[derive(Debug, Clone)]
pub struct RetentionScheduler {
    registry: ServerRegistry,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl RetentionScheduler {
    pub fn new(registry: ServerRegistry) -> Self {
        Self {
            registry,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// After `delay`, stop the server on `port` (if any) and delete `path`
    pub fn schedule(&self, path: PathBuf, port: Option<u16>, delay: Duration) {
        let registry = self.registry.clone();
        let cancel = self.cancel.clone();

        debug!(path = %path.display(), ?port, delay_secs = delay.as_secs(), "Teardown scheduled");

        self.tracker.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    debug!(path = %path.display(), "Teardown brought forward by shutdown");
                }
            }
            teardown(&registry, port, &path).await;
        });
    }

    /// Teardowns still waiting or running
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Run every pending teardown now and wait for all of them
    pub async fn shutdown(&self) {
        info!(pending = self.pending(), "Running pending teardowns");
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn teardown(registry: &ServerRegistry, port: Option<u16>, path: &Path) {
    if let Some(port) = port {
        registry.shutdown(port).await;
    }
    discard_file(path).await;
}

/// Delete `path` if it exists. Returns whether a file was removed.
pub async fn discard_file(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            info!(%filename, "Cleanup: file removed");
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove file");
            false
        }
    }
}
