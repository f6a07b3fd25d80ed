//! # depot-catalog
//!
//! Implementations of [`depot_core::CatalogStore`], the contract of the
//! external item metadata service:
//!
//! - [`HttpCatalog`]: reqwest client against the live service
//! - [`CachedCatalog`]: TTL cache that serves stale snapshots on upstream failure
//! - [`MemoryCatalog`]: in-memory store for tests and offline runs

pub mod cache;
pub mod config;
pub mod http;
pub mod memory;

pub use cache::{needs_refresh, Cached, CachedCatalog};
pub use config::CatalogConfig;
pub use http::HttpCatalog;
pub use memory::MemoryCatalog;
