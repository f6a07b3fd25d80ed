//! TTL cache in front of a [`CatalogStore`].
//!
//! Each snapshot is held as `{value, fetched_at}`. [`needs_refresh`] decides
//! when to go upstream; when the refresh fails and a previous snapshot exists,
//! the stale snapshot is served and a warning is logged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use depot_core::{CatalogStore, Item, Result, StaticBinding};

/// A cached value and the moment it was fetched.
#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub value: T,
    pub fetched_at: Instant,
}

/// Refresh policy: a snapshot older than `ttl` is refreshed.
pub fn needs_refresh(fetched_at: Instant, now: Instant, ttl: Duration) -> bool {
    now.saturating_duration_since(fetched_at) >= ttl
}

/// Catalog wrapper that caches item and binding listings.
pub struct CachedCatalog {
    inner: Arc<dyn CatalogStore>,
    ttl: Duration,
    items: RwLock<Option<Cached<Vec<Item>>>>,
    bindings: RwLock<Option<Cached<Vec<StaticBinding>>>>,
}

impl CachedCatalog {
    pub fn new(inner: Arc<dyn CatalogStore>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            items: RwLock::new(None),
            bindings: RwLock::new(None),
        }
    }

    async fn fresh_items(&self) -> Option<Vec<Item>> {
        let guard = self.items.read().await;
        guard
            .as_ref()
            .filter(|c| !needs_refresh(c.fetched_at, Instant::now(), self.ttl))
            .map(|c| c.value.clone())
    }

    async fn fresh_bindings(&self) -> Option<Vec<StaticBinding>> {
        let guard = self.bindings.read().await;
        guard
            .as_ref()
            .filter(|c| !needs_refresh(c.fetched_at, Instant::now(), self.ttl))
            .map(|c| c.value.clone())
    }
}

#[async_trait]
impl CatalogStore for CachedCatalog {
    async fn list_items(&self) -> Result<Vec<Item>> {
        if let Some(items) = self.fresh_items().await {
            return Ok(items);
        }

        match self.inner.list_items().await {
            Ok(items) => {
                debug!(count = items.len(), "Catalog items refreshed");
                *self.items.write().await = Some(Cached {
                    value: items.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(items)
            }
            Err(e) => match self.items.read().await.as_ref() {
                Some(stale) => {
                    warn!(error = %e, "Catalog unavailable, serving stale items");
                    Ok(stale.value.clone())
                }
                None => Err(e),
            },
        }
    }

    async fn get_item(&self, item_id: i64) -> Result<Option<Item>> {
        match self.inner.get_item(item_id).await {
            Ok(item) => Ok(item),
            Err(e) => {
                let guard = self.items.read().await;
                let stale = guard
                    .as_ref()
                    .and_then(|c| c.value.iter().find(|i| i.item_id == item_id).cloned());
                match stale {
                    Some(item) => {
                        warn!(item_id, error = %e, "Catalog unavailable, serving stale item");
                        Ok(Some(item))
                    }
                    None => Err(e),
                }
            }
        }
    }

    async fn list_bindings(&self) -> Result<Vec<StaticBinding>> {
        if let Some(bindings) = self.fresh_bindings().await {
            return Ok(bindings);
        }

        match self.inner.list_bindings().await {
            Ok(bindings) => {
                *self.bindings.write().await = Some(Cached {
                    value: bindings.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(bindings)
            }
            Err(e) => match self.bindings.read().await.as_ref() {
                Some(stale) => {
                    warn!(error = %e, "Catalog unavailable, serving stale bindings");
                    Ok(stale.value.clone())
                }
                None => Err(e),
            },
        }
    }

    async fn upsert_binding(&self, item_id: i64, item_path: &str) -> Result<()> {
        self.inner.upsert_binding(item_id, item_path).await?;
        // Force the next read upstream but keep the snapshot as a fallback.
        let mut guard = self.bindings.write().await;
        match Instant::now().checked_sub(self.ttl) {
            Some(expired) => {
                if let Some(cached) = guard.as_mut() {
                    cached.fetched_at = expired;
                }
            }
            None => *guard = None,
        }
        Ok(())
    }
}
