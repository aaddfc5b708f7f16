use super::models::{Config, FetchConfig, PortSelection, PublishConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Downloader command must not be empty")]
    EmptyDownloader,

    #[error("Fetch timeout must be positive")]
    InvalidTimeout,

    #[error("Port range start must be non-zero")]
    ZeroPortRangeStart,

    #[error("Port range is empty: {start}..={end}")]
    EmptyPortRange { start: u16, end: u16 },

    #[error("Fixed publish port must be non-zero")]
    ZeroFixedPort,

    #[error("Public host must not be empty")]
    EmptyPublicHost,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_fetch(&config.fetch)?;
    validate_publish(&config.publish)?;
    Ok(())
}

fn validate_fetch(fetch: &FetchConfig) -> Result<(), ValidationError> {
    if fetch.downloader.trim().is_empty() {
        return Err(ValidationError::EmptyDownloader);
    }
    if fetch.timeout_secs == 0 {
        return Err(ValidationError::InvalidTimeout);
    }
    Ok(())
}

fn validate_publish(publish: &PublishConfig) -> Result<(), ValidationError> {
    if publish.port_range_start == 0 {
        return Err(ValidationError::ZeroPortRangeStart);
    }
    if publish.port_range_start > publish.port_range_end {
        return Err(ValidationError::EmptyPortRange {
            start: publish.port_range_start,
            end: publish.port_range_end,
        });
    }
    if publish.port == PortSelection::Fixed(0) {
        return Err(ValidationError::ZeroFixedPort);
    }
    if publish.public_host.trim().is_empty() {
        return Err(ValidationError::EmptyPublicHost);
    }

    if publish.public_host == "localhost" && !publish.detect_public_host {
        tracing::warn!(
            "publish.public_host is 'localhost'; published links only work on this machine"
        );
    }

    Ok(())
}
