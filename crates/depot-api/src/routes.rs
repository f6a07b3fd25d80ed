//! Router assembly.

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::handlers::{self, files, items, operations, sync, upload};
use crate::rate_limit::rate_limit_middleware;
use crate::state::AppState;

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the full application router.
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Uploads
        .route("/upload/:item_id", post(upload::upload_file))
        .route("/upload-folder/:item_id", post(upload::upload_folder))
        .route("/upload-folder-direct/:item_id", post(upload::upload_folder_direct))
        // Listing and reconciliation
        .route("/files", get(files::list_files))
        .route("/sync-static-resources", post(sync::sync_static_resources))
        .route("/sync-structure", post(sync::sync_structure))
        // Read side
        .route("/files/view/*path", get(files::view_file))
        .route("/files/download/*path", get(files::download_file))
        .route("/files/download-folder/*path", get(files::download_folder))
        .route("/files/browse", get(files::browse_root))
        .route("/files/browse/", get(files::browse_root))
        .route("/files/browse/*path", get(files::browse_path))
        // Catalog passthrough
        .route("/items/:item_id", get(items::get_item))
        // Backup/restore
        .route("/backup", get(operations::backup))
        .route("/restore", post(operations::restore).put(operations::restore))
        .route("/operation/:operation_id", get(operations::operation_status))
        // Middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::HeaderName::from_static("x-total-chunks"),
                ])
                .max_age(Duration::from_secs(3600)),
        )
        // Multipart has its own 2 MB default; the outer limit replaces it.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .with_state(state)
}
