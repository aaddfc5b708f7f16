//! Logging setup and pipeline counters

use crate::config::LogMode;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber for `mode`.
///
/// `RUST_LOG` takes precedence over the default `info` level.
pub fn init_tracing(mode: LogMode) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match mode {
        LogMode::Detailed => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogMode::Minimal => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .with_target(false)
            .try_init(),
    };

    // A subscriber is already installed (tests, embedding); keep it
    let _ = result;
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    requests_accepted: AtomicU64,
    requests_busy: AtomicU64,
    fetch_timeouts: AtomicU64,
    fetch_failures: AtomicU64,
    attachments_sent: AtomicU64,
    attach_failures: AtomicU64,
    files_published: AtomicU64,
    publish_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_accepted(&self) {
        self.requests_accepted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "requests_accepted", "Metric incremented");
    }

    pub fn request_busy(&self) {
        self.requests_busy.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "requests_busy", "Metric incremented");
    }

    pub fn fetch_timeout(&self) {
        self.fetch_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "fetch_timeouts", "Metric incremented");
    }

    pub fn fetch_failed(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "fetch_failures", "Metric incremented");
    }

    pub fn attachment_sent(&self) {
        self.attachments_sent.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "attachments_sent", "Metric incremented");
    }

    pub fn attach_failed(&self) {
        self.attach_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "attach_failures", "Metric incremented");
    }

    pub fn file_published(&self) {
        self.files_published.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "files_published", "Metric incremented");
    }

    pub fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "publish_failures", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_accepted: self.requests_accepted.load(Ordering::Relaxed),
            requests_busy: self.requests_busy.load(Ordering::Relaxed),
            fetch_timeouts: self.fetch_timeouts.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            attachments_sent: self.attachments_sent.load(Ordering::Relaxed),
            attach_failures: self.attach_failures.load(Ordering::Relaxed),
            files_published: self.files_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_accepted: u64,
    pub requests_busy: u64,
    pub fetch_timeouts: u64,
    pub fetch_failures: u64,
    pub attachments_sent: u64,
    pub attach_failures: u64,
    pub files_published: u64,
    pub publish_failures: u64,
}
