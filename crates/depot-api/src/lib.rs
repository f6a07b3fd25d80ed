//! # depot-api
//!
//! HTTP surface of depot: uploads, listing, synchronization, read-side file
//! access and the backup/restore control plane, served with axum.
//!
//! The binary in `main.rs` wires the production pieces (HTTP catalog behind a
//! cache, on-disk storage, operation tracker). Tests build the same router
//! around a `MemoryCatalog`:
//!
//! ```no_run
//! use std::sync::Arc;
//! use depot_api::{build_router, AppState};
//! use depot_catalog::MemoryCatalog;
//! use depot_jobs::{OperationTracker, TrackerConfig};
//! use depot_storage::{Storage, StorageConfig};
//!
//! # async fn run() -> depot_core::Result<()> {
//! let storage = Arc::new(Storage::open(&StorageConfig::default()).await?);
//! let tracker = OperationTracker::new(storage.clone(), TrackerConfig::default());
//! let state = AppState::new(storage, Arc::new(MemoryCatalog::new(vec![])), tracker);
//! let app = build_router(state, 1024 * 1024);
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use config::{RateLimitConfig, ServerConfig};
pub use error::ApiError;
pub use rate_limit::{build_limiter, spawn_pruner, ClientRateLimiter};
pub use routes::build_router;
pub use state::AppState;
