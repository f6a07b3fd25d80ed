//! Upload handlers: single file, multipart folder and streamed tar.

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use depot_core::{Item, UploadedFile};
use depot_storage::{FolderPayload, FolderUpload, ListedFile, SingleUpload};

use super::{bad_multipart, body_reader, field_reader, load_item, spool_field};
use crate::error::ApiError;
use crate::state::AppState;

/// Response of `POST /upload/{item_id}`.
#[derive(Debug, Serialize)]
pub struct UploadFileResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub upload: SingleUpload,
    pub item_details: JsonValue,
}

/// Response of the folder upload endpoints.
#[derive(Debug, Serialize)]
pub struct UploadFolderResponse {
    pub success: bool,
    pub message: String,
    pub folder_path: String,
    pub files: Vec<UploadedFile>,
    pub files_count: usize,
    pub item_details: JsonValue,
}

impl UploadFolderResponse {
    fn new(upload: FolderUpload, item: &Item) -> Result<Self, ApiError> {
        let files_count = upload.files.len();
        Ok(Self {
            success: true,
            message: format!("Folder uploaded successfully with {} files", files_count),
            folder_path: upload.folder_path,
            files: upload.files,
            files_count,
            item_details: item_details(item)?,
        })
    }
}

fn item_details(item: &Item) -> Result<JsonValue, ApiError> {
    serde_json::to_value(item).map_err(|e| ApiError::Internal(e.to_string()))
}

/// Store one file for an item.
///
/// # Multipart Fields
/// - `file`: the file (required)
///
/// # Returns
/// - 200 OK with the stored path and binding outcome
/// - 400 Bad Request if the `file` part is missing or has no filename
/// - 404 Not Found if the item is unknown
pub async fn upload_file(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<UploadFileResponse>, ApiError> {
    let item = load_item(&state, item_id).await?;

    let mut stored: Option<SingleUpload> = None;
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let field_name = field.name().map(|n| n.to_string());
        if field_name.as_deref() != Some("file") {
            continue;
        }
        let original = field.file_name().unwrap_or_default().to_string();
        let reader = field_reader(field);
        tokio::pin!(reader);
        stored = Some(
            state
                .storage
                .ingest_file(state.catalog.as_ref(), &item, &original, reader)
                .await?,
        );
        break;
    }

    let upload = stored.ok_or_else(|| ApiError::BadRequest("No file part".to_string()))?;
    Ok(Json(UploadFileResponse {
        success: true,
        message: "File uploaded successfully".to_string(),
        upload,
        item_details: item_details(&item)?,
    }))
}

/// Store a folder for an item from a multipart body.
///
/// # Multipart Fields
/// - `zip_file`: a zip archive of the folder, or
/// - `folder_files`: repeated, each part's filename is its path inside the folder
pub async fn upload_folder(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<UploadFolderResponse>, ApiError> {
    let item = load_item(&state, item_id).await?;

    let spool = tempfile::tempdir()?;
    let mut archive = None;
    let mut listed = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let field_name = field.name().map(|n| n.to_string());
        match field_name.as_deref() {
            Some("zip_file") if archive.is_none() => {
                let target = spool.path().join("folder.zip");
                let bytes = spool_field(field, &target).await?;
                debug!(item_id, bytes, "Folder archive received");
                archive = Some(target);
            }
            Some("folder_files") => {
                let relative_path = field.file_name().unwrap_or_default().to_string();
                let source = spool.path().join(format!("part-{}", listed.len()));
                spool_field(field, &source).await?;
                listed.push(ListedFile {
                    relative_path,
                    source,
                });
            }
            _ => {}
        }
    }

    let payload = match archive {
        Some(archive) => FolderPayload::Zip { archive },
        None if !listed.is_empty() => FolderPayload::FileList(listed),
        None => return Err(ApiError::BadRequest("No folder data uploaded".to_string())),
    };

    let upload = state
        .storage
        .ingest_folder(state.catalog.as_ref(), &item, payload)
        .await?;
    info!(item_id, file_count = upload.files.len(), path = %upload.folder_path, "Folder upload stored");
    Ok(Json(UploadFolderResponse::new(upload, &item)?))
}

/// Store a folder for an item from a raw tar body (plain or gzip).
pub async fn upload_folder_direct(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    body: Body,
) -> Result<Json<UploadFolderResponse>, ApiError> {
    let item = load_item(&state, item_id).await?;
    let upload = state
        .storage
        .ingest_tar_stream(state.catalog.as_ref(), &item, body_reader(body))
        .await?;
    info!(item_id, file_count = upload.files.len(), path = %upload.folder_path, "Tar upload stored");
    Ok(Json(UploadFolderResponse::new(upload, &item)?))
}
