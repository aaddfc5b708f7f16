//! Outbound chat messages
//!
//! The pipeline talks to the chat platform only through [`ChatSink`]. Every
//! user-facing failure carries a stable numeric code.

use crate::humanize::duration_words;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Attachment rejected: {0}")]
    AttachmentRejected(String),
}

pub type Result<T> = std::result::Result<T, MessagingError>;

/// Reply channel for one inbound message
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Send a plain-text message
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Send `text` with `data` attached as `filename`
    async fn send_file(&self, text: &str, filename: &str, data: Bytes) -> Result<()>;
}

/// Every message the bot sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Busy,
    Timeout { limit: Duration },
    DownloadFailed,
    PublishFailed,
    AttachFailed,
    Attached,
    Published { url: String },
}

impl Notice {
    /// Numeric code shown to users; success notices have none
    pub fn code(&self) -> Option<u16> {
        match self {
            Notice::Busy => Some(100),
            Notice::Timeout { .. } => Some(101),
            Notice::DownloadFailed => Some(102),
            Notice::PublishFailed => Some(103),
            Notice::AttachFailed => Some(110),
            Notice::Attached | Notice::Published { .. } => None,
        }
    }

    pub fn text(&self) -> String {
        match self {
            Notice::Busy => "🔒 ERROR 100: Bot is busy, try again later.".to_string(),
            Notice::Timeout { limit } => format!(
                "❌ ERROR 101: The download took longer than {} and was cancelled.",
                duration_words(*limit)
            ),
            Notice::DownloadFailed => {
                "❌ ERROR 102: Could not download the link. It may be invalid or protected."
                    .to_string()
            }
            Notice::PublishFailed => "❌ ERROR 103: Could not publish the file online.".to_string(),
            Notice::AttachFailed => "❌ ERROR 110: Internal error while sending the file.".to_string(),
            Notice::Attached => "✅ Done, here is your file.".to_string(),
            Notice::Published { url } => format!(
                "✅ File too large to attach.\n🔗 Temporary link (expires in 1 hour): {}",
                url
            ),
        }
    }
}

/// What a [`RecordingSink`] was asked to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Text(String),
    File {
        text: String,
        filename: String,
        size: usize,
    },
}

/// Sink that keeps everything in memory, for tests and dry runs
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<SentMessage>>,
    reject_files: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose file uploads always fail, like an oversized attachment
    pub fn rejecting_files() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject_files: true,
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, message: SentMessage) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }
}

#[async_trait]
impl ChatSink for RecordingSink {
    async fn send_text(&self, text: &str) -> Result<()> {
        tracing::debug!(text, "Recorded text message");
        self.push(SentMessage::Text(text.to_string()));
        Ok(())
    }

    async fn send_file(&self, text: &str, filename: &str, data: Bytes) -> Result<()> {
        if self.reject_files {
            return Err(MessagingError::AttachmentRejected(filename.to_string()));
        }
        self.push(SentMessage::File {
            text: text.to_string(),
            filename: filename.to_string(),
            size: data.len(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(Notice::Busy.code(), Some(100));
        assert_eq!(
            Notice::Timeout {
                limit: Duration::from_secs(300)
            }
            .code(),
            Some(101)
        );
        assert_eq!(Notice::DownloadFailed.code(), Some(102));
        assert_eq!(Notice::PublishFailed.code(), Some(103));
        assert_eq!(Notice::AttachFailed.code(), Some(110));
        assert_eq!(Notice::Attached.code(), None);
    }

    #[test]
    fn test_text_embeds_code() {
        for notice in [
            Notice::Busy,
            Notice::Timeout {
                limit: Duration::from_secs(300),
            },
            Notice::DownloadFailed,
            Notice::PublishFailed,
            Notice::AttachFailed,
        ] {
            let code = notice.code().unwrap();
            assert!(notice.text().contains(&format!("ERROR {}", code)));
        }
    }

    #[test]
    fn test_timeout_notice_states_limit() {
        let default = Notice::Timeout {
            limit: Duration::from_secs(300),
        };
        assert!(default.text().contains("longer than 5 minutes"));

        let configured = Notice::Timeout {
            limit: Duration::from_secs(45),
        };
        assert!(configured.text().contains("longer than 45 seconds"));
        assert!(!configured.text().contains("5 minutes"));
    }

    #[test]
    fn test_published_notice() {
        let text = Notice::Published {
            url: "http://host:8123/download_1_2.mp4".to_string(),
        }
        .text();
        assert!(text.contains("http://host:8123/download_1_2.mp4"));
        assert!(text.contains("1 hour"));
    }

    #[tokio::test]
    async fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.send_text("hello").await.unwrap();
        sink.send_file("here", "a.mp4", Bytes::from_static(b"abc"))
            .await
            .unwrap();

        assert_eq!(
            sink.sent(),
            vec![
                SentMessage::Text("hello".to_string()),
                SentMessage::File {
                    text: "here".to_string(),
                    filename: "a.mp4".to_string(),
                    size: 3,
                },
            ]
        );

        let rejecting = RecordingSink::rejecting_files();
        assert!(
            rejecting
                .send_file("here", "a.mp4", Bytes::new())
                .await
                .is_err()
        );
        assert!(rejecting.sent().is_empty());
    }
}
