//! HTTP handlers and the helpers they share.

pub mod files;
pub mod items;
pub mod operations;
pub mod sync;
pub mod upload;

use std::io;
use std::path::Path;

use axum::body::Body;
use axum::extract::multipart::{Field, MultipartError};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::TryStreamExt;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::io::{ReaderStream, StreamReader};

use depot_core::{Error, Item};
use depot_storage::mime_for;

use crate::error::ApiError;
use crate::state::AppState;

/// Health check.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Fetch the item an upload targets; unknown ids are 404.
pub(crate) async fn load_item(state: &AppState, item_id: i64) -> Result<Item, ApiError> {
    state
        .catalog
        .get_item(item_id)
        .await?
        .ok_or_else(|| Error::ItemNotFound(item_id).into())
}

pub(crate) fn bad_multipart(e: MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Multipart error: {}", e))
}

/// Multipart field as an `AsyncRead`.
pub(crate) fn field_reader(field: Field<'_>) -> impl AsyncRead + Send + '_ {
    StreamReader::new(field.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Raw request body as an `AsyncRead`.
pub(crate) fn body_reader(body: Body) -> impl AsyncRead + Send + Unpin + 'static {
    StreamReader::new(
        body.into_data_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
    )
}

/// Write a multipart field to `target`. Returns the byte count.
pub(crate) async fn spool_field(field: Field<'_>, target: &Path) -> Result<u64, ApiError> {
    let reader = field_reader(field);
    tokio::pin!(reader);
    let mut file = tokio::fs::File::create(target).await?;
    let bytes = tokio::io::copy(&mut reader, &mut file).await?;
    file.flush().await?;
    Ok(bytes)
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Disposition {
    Inline,
    Attachment,
}

pub(crate) fn content_disposition(
    disposition: Disposition,
    filename: &str,
) -> Result<HeaderValue, ApiError> {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    let kind = match disposition {
        Disposition::Inline => "inline",
        Disposition::Attachment => "attachment",
    };
    HeaderValue::from_str(&format!("{}; filename=\"{}\"", kind, safe))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Stream a file from disk with its guessed MIME type.
pub(crate) async fn serve_file(path: &Path, disposition: Disposition) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&mime_for(path)).map_err(|e| ApiError::Internal(e.to_string()))?,
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition(disposition, &filename)?,
    );

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((StatusCode::OK, headers, body).into_response())
}
