//! Reconciliation triggers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use depot_core::SyncReport;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directories_created: Option<Vec<String>>,
    #[serde(flatten)]
    pub report: SyncReport,
}

pub async fn sync_static_resources(
    State(state): State<AppState>,
) -> Result<Json<SyncResponse>, ApiError> {
    let report = state.storage.sync_all(state.catalog.as_ref()).await?;
    Ok(Json(SyncResponse {
        success: true,
        message: format!("Synchronized {} of {} files", report.updated, report.total),
        directories_created: None,
        report,
    }))
}

pub async fn sync_structure(State(state): State<AppState>) -> Result<Json<SyncResponse>, ApiError> {
    let structure = state.storage.sync_structure(state.catalog.as_ref()).await?;
    Ok(Json(SyncResponse {
        success: true,
        message: format!(
            "Created {} directories, synchronized {} of {} files",
            structure.directories_created.len(),
            structure.sync.updated,
            structure.sync.total
        ),
        directories_created: Some(structure.directories_created),
        report: structure.sync,
    }))
}
