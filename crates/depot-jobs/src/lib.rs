//! # depot-jobs
//!
//! Backup and restore operations for depot.
//!
//! This crate provides:
//! - A lock-guarded operation registry shared by handlers and background tasks
//! - Asynchronous backups written to a per-operation temp directory
//! - Full and chunked restore uploads feeding the crash-safe restore pipeline
//! - Retention and grace cleanup of finished operations
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use depot_jobs::{OperationTracker, TrackerConfig};
//! use depot_storage::{Storage, StorageConfig};
//!
//! let storage = Arc::new(Storage::open(&StorageConfig::from_env()).await?);
//! let tracker = OperationTracker::new(storage, TrackerConfig::from_env());
//!
//! let record = tracker.start_backup().await?;
//! let mut events = tracker.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! tracker.shutdown();
//! ```

pub mod chunks;
pub mod config;
pub mod registry;
pub mod tracker;

pub use chunks::{assemble_chunks, chunk_path, ChunkReceipt, ASSEMBLED_ARCHIVE};
pub use config::TrackerConfig;
pub use registry::OperationRegistry;
pub use tracker::{OperationTracker, TrackerEvent};
