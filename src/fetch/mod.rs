//! Downloader subprocess execution
//!
//! The external tool is an opaque command: it receives the URL and an output
//! stem, exits 0 on success and writes exactly one file whose name starts with
//! the stem. Everything else (format choice, merging) is the tool's business.

mod executor;
mod output;

pub use executor::FetchExecutor;
pub use output::{remove_partials, resolve_output};

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Wall-clock budget for one download
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Extensions the downloader appends to the stem, probed in this order
pub const OUTPUT_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "mov", "avi"];

/// Preferred format: anything under 50 MB, otherwise the best available
pub const FORMAT_SELECTOR: &str = "best[filesize<50M]/best";

/// Hard cap passed to the downloader
pub const MAX_FILESIZE: &str = "100M";

/// Outcome of one downloader run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Success { path: PathBuf, size_bytes: u64 },
    Timeout,
    Failure(String),
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success { .. })
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Downloader '{program}' could not be started: {source}")]
    NotInstalled {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Downloader '{program}' is not working: {stderr}")]
    Broken { program: String, stderr: String },

    #[error("Work directory unavailable: {0}")]
    WorkDir(#[from] std::io::Error),
}
