//! Core traits for depot abstractions.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Item, StaticBinding};

// =============================================================================
// CATALOG TRAITS
// =============================================================================

/// Request/response contract of the external item metadata service.
///
/// Items are read-only from depot's side; bindings are the only thing depot
/// writes back.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All catalog items.
    async fn list_items(&self) -> Result<Vec<Item>>;

    /// One item; `Ok(None)` when the catalog does not know the id.
    async fn get_item(&self, item_id: i64) -> Result<Option<Item>>;

    /// All recorded item-to-path bindings.
    async fn list_bindings(&self) -> Result<Vec<StaticBinding>>;

    /// Create or replace the binding of `item_id`.
    async fn upsert_binding(&self, item_id: i64, item_path: &str) -> Result<()>;
}
