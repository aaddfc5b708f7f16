//! External address discovery for published links

use std::time::Duration;
use tracing::{info, warn};

const DETECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Ask an IP echo service for this host's public address.
///
/// Any failure (network, status, empty or multi-line body) yields `fallback`.
pub async fn detect_public_host(echo_url: &str, fallback: &str) -> String {
    match query(echo_url).await {
        Ok(host) => {
            info!(%host, "Detected public host");
            host
        }
        Err(e) => {
            warn!(echo_url, error = %e, %fallback, "Public host detection failed, using fallback");
            fallback.to_string()
        }
    }
}

async fn query(echo_url: &str) -> Result<String, String> {
    let client = reqwest::Client::builder()
        .timeout(DETECT_TIMEOUT)
        .build()
        .map_err(|e| e.to_string())?;

    let response = client.get(echo_url).send().await.map_err(|e| e.to_string())?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {}", status.as_u16()));
    }

    let body = response.text().await.map_err(|e| e.to_string())?;
    let host = body.trim();
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(format!("unexpected response body: {:?}", body));
    }
    Ok(host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::get};
    use tokio::net::TcpListener;

    async fn echo_server(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_uses_echoed_address() {
        let url = echo_server(Router::new().route("/", get(|| async { "203.0.113.9\n" }))).await;
        assert_eq!(detect_public_host(&url, "localhost").await, "203.0.113.9");
    }

    #[tokio::test]
    async fn test_error_status_falls_back() {
        let url = echo_server(Router::new().route(
            "/",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        ))
        .await;
        assert_eq!(detect_public_host(&url, "localhost").await, "localhost");
    }

    #[tokio::test]
    async fn test_garbage_body_falls_back() {
        let url = echo_server(Router::new().route("/", get(|| async { "<html> oops </html>" }))).await;
        assert_eq!(detect_public_host(&url, "fallback.example").await, "fallback.example");
    }

    #[tokio::test]
    async fn test_unreachable_falls_back() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{}/", addr);
        assert_eq!(detect_public_host(&url, "localhost").await, "localhost");
    }
}
