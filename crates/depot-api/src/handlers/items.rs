use axum::extract::{Path, State};
use axum::Json;

use depot_core::Item;

use super::load_item;
use crate::error::ApiError;
use crate::state::AppState;

/// Catalog item passthrough.
pub async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
) -> Result<Json<Item>, ApiError> {
    Ok(Json(load_item(&state, item_id).await?))
}
