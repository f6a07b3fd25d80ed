//! Backup/restore control plane.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use depot_core::defaults::{TIMESTAMP_FORMAT, TOTAL_CHUNKS_HEADER};
use depot_core::{OperationRecord, OperationStatus};

use super::{body_reader, content_disposition, serve_file, Disposition};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BackupQuery {
    /// Build and return the archive in the response (default) instead of
    /// starting a background operation.
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct RestoreQuery {
    #[serde(default)]
    pub chunk: bool,
    pub operation_id: Option<String>,
    pub chunk_number: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OperationQuery {
    #[serde(default)]
    pub download: bool,
}

/// Reply to a request that started an operation.
#[derive(Debug, Serialize)]
pub struct OperationStarted {
    pub operation_id: String,
    pub status: OperationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u64>,
}

impl From<OperationRecord> for OperationStarted {
    fn from(record: OperationRecord) -> Self {
        Self {
            operation_id: record.operation_id,
            status: record.status,
            total_chunks: record.total_chunks,
        }
    }
}

/// `GET /backup`: the zip itself, or `202` with an operation id.
pub async fn backup(
    State(state): State<AppState>,
    Query(query): Query<BackupQuery>,
) -> Result<Response, ApiError> {
    if !query.stream {
        let record = state.tracker.start_backup().await?;
        return Ok((StatusCode::ACCEPTED, Json(OperationStarted::from(record))).into_response());
    }

    let (bytes, _summary) = state.tracker.backup_now().await?;
    let filename = format!("backup_{}.zip", Utc::now().format(TIMESTAMP_FORMAT));
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition(Disposition::Attachment, &filename)?,
    );
    Ok((StatusCode::OK, headers, bytes).into_response())
}

/// `POST /restore` in its three shapes:
///
/// - no `chunk`: the body is the whole archive
/// - `chunk=true` without `operation_id`: open a chunked upload, the chunk
///   count comes from the `X-Total-Chunks` header
/// - `chunk=true&operation_id=..&chunk_number=k`: the body is chunk `k`
pub async fn restore(
    State(state): State<AppState>,
    Query(query): Query<RestoreQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    if !query.chunk {
        let record = state.tracker.start_restore(body_reader(body)).await?;
        return Ok((StatusCode::ACCEPTED, Json(OperationStarted::from(record))).into_response());
    }

    match query.operation_id {
        None => {
            let total_chunks = headers
                .get(TOTAL_CHUNKS_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or_else(|| {
                    ApiError::BadRequest(format!(
                        "Missing or invalid {} header",
                        TOTAL_CHUNKS_HEADER
                    ))
                })?;
            let record = state.tracker.begin_chunked_restore(total_chunks).await?;
            Ok((StatusCode::CREATED, Json(OperationStarted::from(record))).into_response())
        }
        Some(operation_id) => {
            let chunk_number = query
                .chunk_number
                .ok_or_else(|| ApiError::BadRequest("Missing chunk_number".to_string()))?;
            let receipt = state
                .tracker
                .receive_chunk(&operation_id, chunk_number, body_reader(body))
                .await?;
            Ok(Json(receipt).into_response())
        }
    }
}

/// `GET /operation/{id}`: the record, or the backup archive with `download=true`.
pub async fn operation_status(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
    Query(query): Query<OperationQuery>,
) -> Result<Response, ApiError> {
    if query.download {
        let path = state.tracker.download_path(&operation_id).await?;
        return serve_file(&path, Disposition::Attachment).await;
    }
    let record = state.tracker.get(&operation_id).await?;
    Ok(Json(record).into_response())
}
