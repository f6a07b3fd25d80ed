//! # depot-core
//!
//! Core types, traits, and pure logic for depot, a file storage service that
//! places uploads under a directory tree derived from external item metadata.
//!
//! This crate holds the pieces every other depot crate agrees on: the catalog
//! entities and operation records, the `Error`/`Result` pair, filename and
//! path safety, the Path Resolver, and the Similarity-Based Item Matcher.
//!
//! ## Logging conventions
//!
//! All crates log through `tracing` with a shared field vocabulary:
//! `operation_id`, `item_id`, `path`, `duration_ms`, `file_count`, `bytes`
//! and `error`. Levels mean:
//!
//! - `ERROR`: degraded state that needs attention (a restore rollback failed)
//! - `WARN`: recovered with a fallback (binding upsert failed, stale catalog served)
//! - `INFO`: lifecycle events and operation completions
//! - `DEBUG`: decision points (root discovery result, matcher choice)
//! - `TRACE`: per-file iteration

pub mod defaults;
pub mod error;
pub mod file_safety;
pub mod matcher;
pub mod models;
pub mod paths;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use file_safety::{
    checked_segment, relative_path_string, safe_relative_path, sanitize_filename,
    split_extension,
};
pub use matcher::{extract_ids, score_candidate, similarity_ratio, strip_view_prefix, ItemMatcher};
pub use models::*;
pub use paths::{resolve_collision, PathResolver};
pub use traits::*;
