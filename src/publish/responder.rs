//! HTTP responder that serves one file for every GET, whatever the path

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

#[derive(Debug)]
struct ServedFile {
    path: PathBuf,
    filename: String,
}

/// Router answering `GET /` and `GET /<anything>` with `path`.
///
/// No request logging layer is installed.
pub fn router(path: PathBuf) -> Router {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let state = Arc::new(ServedFile { path, filename });

    Router::new()
        .route("/", get(serve_file))
        .route("/{*path}", get(serve_file))
        .with_state(state)
}

/// MIME type announced for a served file, by extension
pub fn content_type_for(path: &Path) -> mime::Mime {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());

    let essence = match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        _ => return mime::APPLICATION_OCTET_STREAM,
    };
    essence.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

async fn serve_file(State(file): State<Arc<ServedFile>>) -> Response {
    let handle = match tokio::fs::File::open(&file.path).await {
        Ok(handle) => handle,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return (StatusCode::NOT_FOUND, "File not found").into_response();
        }
        Err(e) => return internal_error(e),
    };

    let length = match handle.metadata().await {
        Ok(metadata) => metadata.len(),
        Err(e) => return internal_error(e),
    };

    let disposition = format!("inline; filename=\"{}\"", file.filename.replace('"', ""));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&file.path).as_ref())
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, length)
        .body(Body::from_stream(ReaderStream::new(handle)))
        .unwrap_or_else(|e| internal_error(e))
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Internal error: {}", e),
    )
        .into_response()
}
