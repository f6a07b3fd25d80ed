//! In-memory [`CatalogStore`] for tests and offline runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use depot_core::{CatalogStore, Error, Item, Result, StaticBinding};

/// Catalog held in memory. Availability and upsert rejection can be toggled
/// to exercise the degraded paths of callers.
pub struct MemoryCatalog {
    items: RwLock<Vec<Item>>,
    bindings: RwLock<Vec<StaticBinding>>,
    available: AtomicBool,
    reject_upserts: AtomicBool,
    list_calls: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items: RwLock::new(items),
            bindings: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
            reject_upserts: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_bindings(self, bindings: Vec<StaticBinding>) -> Self {
        Self {
            bindings: RwLock::new(bindings),
            ..self
        }
    }

    /// When false, every call fails as if the service were unreachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// When true, binding upserts fail with a 500 from "upstream".
    pub fn set_reject_upserts(&self, reject: bool) {
        self.reject_upserts.store(reject, Ordering::SeqCst);
    }

    /// Number of `list_items` calls that reached this store.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Current binding of `item_id`.
    pub async fn binding(&self, item_id: i64) -> Option<String> {
        self.bindings
            .read()
            .await
            .iter()
            .find(|b| b.item_id == item_id)
            .and_then(|b| b.item_path.clone())
    }

    pub async fn insert_item(&self, item: Item) {
        self.items.write().await.push(item);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Upstream("catalog unavailable".to_string()))
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn list_items(&self) -> Result<Vec<Item>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        Ok(self.items.read().await.clone())
    }

    async fn get_item(&self, item_id: i64) -> Result<Option<Item>> {
        self.ensure_available()?;
        Ok(self
            .items
            .read()
            .await
            .iter()
            .find(|i| i.item_id == item_id)
            .cloned())
    }

    async fn list_bindings(&self) -> Result<Vec<StaticBinding>> {
        self.ensure_available()?;
        Ok(self.bindings.read().await.clone())
    }

    async fn upsert_binding(&self, item_id: i64, item_path: &str) -> Result<()> {
        self.ensure_available()?;
        if self.reject_upserts.load(Ordering::SeqCst) {
            return Err(Error::UpstreamRejected {
                status: 500,
                message: "binding update rejected".to_string(),
            });
        }
        if !self.items.read().await.iter().any(|i| i.item_id == item_id) {
            return Err(Error::UpstreamRejected {
                status: 404,
                message: format!("item {} not found", item_id),
            });
        }

        let mut bindings = self.bindings.write().await;
        match bindings.iter_mut().find(|b| b.item_id == item_id) {
            Some(existing) => existing.item_path = Some(item_path.to_string()),
            None => bindings.push(StaticBinding::new(item_id, item_path)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_overwrites_single_slot() {
        let catalog = MemoryCatalog::new(vec![Item::new(4, "docs", "pdf", "x")]);

        catalog.upsert_binding(4, "docs/pdf/x.pdf").await.unwrap();
        catalog.upsert_binding(4, "docs/pdf/x_1.pdf").await.unwrap();

        let bindings = catalog.list_bindings().await.unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(catalog.binding(4).await.as_deref(), Some("docs/pdf/x_1.pdf"));
    }

    #[tokio::test]
    async fn test_upsert_unknown_item_rejected() {
        let catalog = MemoryCatalog::new(vec![]);
        let err = catalog.upsert_binding(1, "a/b/c").await.unwrap_err();
        assert!(matches!(err, Error::UpstreamRejected { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_unavailable() {
        let catalog = MemoryCatalog::new(vec![Item::new(1, "a", "b", "c")]);
        catalog.set_available(false);
        assert!(matches!(catalog.get_item(1).await, Err(Error::Upstream(_))));
        catalog.set_available(true);
        assert!(catalog.get_item(1).await.unwrap().is_some());
        assert!(catalog.get_item(2).await.unwrap().is_none());
    }
}
