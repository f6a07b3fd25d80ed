//! Read-side handlers: listing, view, download and browse.
//!
//! Every path goes through `Storage::resolve_existing`, which rejects
//! anything escaping the storage root with 403.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use depot_core::FileEntry;
use depot_storage::Browse;

use super::{content_disposition, serve_file, Disposition};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileEntry>,
    pub total: usize,
}

/// Every stored file with its inferred owner. Degrades to no owners when
/// the catalog is down.
pub async fn list_files(State(state): State<AppState>) -> Result<Json<FileListResponse>, ApiError> {
    let files = state.storage.list_files(state.catalog.as_ref()).await?;
    let total = files.len();
    Ok(Json(FileListResponse { files, total }))
}

pub async fn view_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let full = state.storage.file(&path).await?;
    serve_file(&full, Disposition::Inline).await
}

pub async fn download_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let full = state.storage.file(&path).await?;
    serve_file(&full, Disposition::Attachment).await
}

/// Zip a folder and send it as `{folder_name}.zip`.
pub async fn download_folder(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let (folder_name, bytes) = state.storage.zip_folder(&path).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition(Disposition::Attachment, &format!("{}.zip", folder_name))?,
    );
    Ok((StatusCode::OK, headers, bytes).into_response())
}

pub async fn browse_root(State(state): State<AppState>) -> Result<Response, ApiError> {
    browse(&state, "").await
}

pub async fn browse_path(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    browse(&state, &path).await
}

async fn browse(state: &AppState, raw: &str) -> Result<Response, ApiError> {
    match state.storage.browse(raw).await? {
        Browse::Directory(listing) => Ok(Json(listing).into_response()),
        Browse::File(full) => serve_file(&full, Disposition::Inline).await,
    }
}
