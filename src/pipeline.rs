//! Single-flight download-and-deliver pipeline
//!
//! ## Flow:
//! 1. Extract the first URL from the message text (no URL: ignore silently)
//! 2. Take the single-flight gate, or reject with "busy" (told only in DMs)
//! 3. Run the downloader with a timeout
//! 4. Attach files up to the platform ceiling, publish larger ones over HTTP
//! 5. Schedule teardown for published files; delete attached ones at once
//!
//! The gate permit lives for steps 3-5 and is released on every exit path.

use crate::dispatch::{self, Delivery};
use crate::fetch::{FetchExecutor, FetchResult};
use crate::gate::SingleFlightGate;
use crate::humanize::ByteSize;
use crate::links::extract_url;
use crate::messaging::{ChatSink, Notice};
use crate::observability::Metrics;
use crate::publish::{EphemeralPublisher, PublishError, PublishedFile};
use crate::retention::{FILE_RETENTION, RetentionScheduler, discard_file};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

/// Where a message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// One-to-one conversation with the bot
    Direct,
    /// Shared channel; busy notices are suppressed here
    Group,
}

/// Sender and channel of an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOrigin {
    pub requester_id: u64,
    pub requester_name: String,
    pub channel_kind: ChannelKind,
    pub channel_label: String,
}

/// One accepted download request
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub id: Uuid,
    pub origin: MessageOrigin,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl FetchRequest {
    pub fn new(origin: MessageOrigin, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            origin,
            url: url.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("download exceeded the time limit of {}s", .0.as_secs())]
    FetchTimeout(Duration),

    #[error("download failed: {0}")]
    FetchFailure(String),

    #[error("attachment delivery failed: {0}")]
    DeliveryFailure(String),

    #[error("no port available for publishing: {0}")]
    PublishBindFailure(String),

    #[error("publishing failed: {0}")]
    PublishRuntimeFailure(String),
}

impl PipelineError {
    pub fn notice(&self) -> Notice {
        match self {
            PipelineError::FetchTimeout(limit) => Notice::Timeout { limit: *limit },
            PipelineError::FetchFailure(_) => Notice::DownloadFailed,
            PipelineError::DeliveryFailure(_) => Notice::AttachFailed,
            PipelineError::PublishBindFailure(_) | PipelineError::PublishRuntimeFailure(_) => {
                Notice::PublishFailed
            }
        }
    }

    /// User-facing error code
    pub fn code(&self) -> u16 {
        self.notice().code().unwrap_or_default()
    }
}

impl From<PublishError> for PipelineError {
    fn from(value: PublishError) -> Self {
        match &value {
            PublishError::BindExhausted { .. } => PipelineError::PublishBindFailure(value.to_string()),
            _ => PipelineError::PublishRuntimeFailure(value.to_string()),
        }
    }
}

/// How a successful request was delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    Attached { filename: String, size_bytes: u64 },
    Published(PublishedFile),
}

/// Result of handling one inbound message
#[derive(Debug)]
pub enum Outcome {
    /// No URL in the message
    Ignored,
    /// Another download was running
    Busy,
    Delivered(Delivered),
    Failed(PipelineError),
}

/// Wiring of the pipeline's collaborators
pub struct Pipeline {
    gate: SingleFlightGate,
    executor: FetchExecutor,
    publisher: EphemeralPublisher,
    scheduler: RetentionScheduler,
    metrics: Arc<Metrics>,
    retention: Duration,
}

impl Pipeline {
    pub fn new(
        executor: FetchExecutor,
        publisher: EphemeralPublisher,
        scheduler: RetentionScheduler,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            gate: SingleFlightGate::new(),
            executor,
            publisher,
            scheduler,
            metrics,
            retention: FILE_RETENTION,
        }
    }

    /// Shorten the retention window (integration tests)
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn gate(&self) -> &SingleFlightGate {
        &self.gate
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn scheduler(&self) -> &RetentionScheduler {
        &self.scheduler
    }

    /// Handle one inbound message end to end, replying through `sink`
    pub async fn handle_message(&self, text: &str, origin: MessageOrigin, sink: &dyn ChatSink) -> Outcome {
        let Some(url) = extract_url(text) else {
            return Outcome::Ignored;
        };

        let Some(_permit) = self.gate.try_acquire() else {
            self.metrics.request_busy();
            info!(
                user_id = origin.requester_id,
                channel = %origin.channel_label,
                "Bot busy, message ignored while a download is in progress"
            );
            if origin.channel_kind == ChannelKind::Direct {
                notify(sink, &Notice::Busy).await;
            }
            return Outcome::Busy;
        };

        self.metrics.request_accepted();
        let request = FetchRequest::new(origin, url);
        let span = info_span!("request", id = %request.id);

        match self.process(&request, sink).instrument(span).await {
            Ok(delivered) => Outcome::Delivered(delivered),
            Err(e) => {
                error!(code = e.code(), error = %e, "Request failed");
                notify(sink, &e.notice()).await;
                Outcome::Failed(e)
            }
        }
    }

    async fn process(&self, request: &FetchRequest, sink: &dyn ChatSink) -> Result<Delivered, PipelineError> {
        let started = Instant::now();
        info!(
            username = %request.origin.requester_name,
            user_id = request.origin.requester_id,
            channel = %request.origin.channel_label,
            url = %request.url,
            "Download started"
        );

        let stem = self
            .executor
            .output_stem(request.origin.requester_id, request.created_at);

        let (path, size_bytes) = match self.executor.fetch(&request.url, &stem).await {
            FetchResult::Success { path, size_bytes } => (path, size_bytes),
            FetchResult::Timeout => {
                self.metrics.fetch_timeout();
                warn!(timeout_secs = self.executor.timeout().as_secs(), "Download timed out");
                return Err(PipelineError::FetchTimeout(self.executor.timeout()));
            }
            FetchResult::Failure(reason) => {
                self.metrics.fetch_failed();
                return Err(PipelineError::FetchFailure(reason));
            }
        };

        info!(
            filename = %file_name(&path),
            size = %ByteSize(size_bytes),
            duration_secs = started.elapsed().as_secs_f64(),
            "Download completed"
        );

        match dispatch::decide(size_bytes) {
            Delivery::Attach => self.attach(&path, size_bytes, sink).await,
            Delivery::Publish => self.publish(&path, sink).await,
        }
    }

    /// Upload the file with the reply, then delete it whatever happened
    async fn attach(&self, path: &Path, size_bytes: u64, sink: &dyn ChatSink) -> Result<Delivered, PipelineError> {
        let filename = file_name(path);
        let result = send_attachment(path, &filename, sink).await;
        discard_file(path).await;

        match result {
            Ok(()) => {
                self.metrics.attachment_sent();
                info!(%filename, "Sent as attachment");
                Ok(Delivered::Attached {
                    filename,
                    size_bytes,
                })
            }
            Err(e) => {
                self.metrics.attach_failed();
                Err(e)
            }
        }
    }

    /// Serve the file and reply with its link; delete it at once if that fails
    async fn publish(&self, path: &Path, sink: &dyn ChatSink) -> Result<Delivered, PipelineError> {
        let published = match self.publisher.publish(path, self.retention).await {
            Ok(published) => published,
            Err(e) => {
                self.metrics.publish_failed();
                discard_file(path).await;
                return Err(e.into());
            }
        };

        self.metrics.file_published();
        info!(
            filename = %file_name(path),
            url = %published.url,
            expires_secs = self.retention.as_secs(),
            "Serving file online"
        );

        self.scheduler
            .schedule(path.to_path_buf(), Some(published.port), self.retention);

        notify(
            sink,
            &Notice::Published {
                url: published.url.clone(),
            },
        )
        .await;

        Ok(Delivered::Published(published))
    }
}

async fn send_attachment(path: &Path, filename: &str, sink: &dyn ChatSink) -> Result<(), PipelineError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::DeliveryFailure(e.to_string()))?;

    sink.send_file(&Notice::Attached.text(), filename, Bytes::from(data))
        .await
        .map_err(|e| PipelineError::DeliveryFailure(e.to_string()))
}

/// Notices are best-effort; a failed reply never changes the outcome
async fn notify(sink: &dyn ChatSink, notice: &Notice) {
    if let Err(e) = sink.send_text(&notice.text()).await {
        warn!(code = ?notice.code(), error = %e, "Failed to send notice");
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
