//! Static-Binding Synchronizer and file listing.
//!
//! Both walk the whole tree and ask the matcher who owns each file. The
//! listing tolerates a catalog outage (every file comes back with no item);
//! synchronization needs the item list and fails without it.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use depot_core::{
    CatalogStore, Error, FileEntry, Item, ItemMatcher, Result, StaticBinding, SyncEntry,
    SyncReport, SyncStatus,
};

use crate::storage::Storage;

/// Report of `sync-structure`: directories created, then the sync report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StructureReport {
    pub directories_created: Vec<String>,
    #[serde(flatten)]
    pub sync: SyncReport,
}

impl Storage {
    fn matcher(&self) -> ItemMatcher {
        ItemMatcher::new(self.view_prefix())
    }

    /// Bindings, or none when the catalog cannot provide them.
    async fn bindings_or_empty(&self, catalog: &dyn CatalogStore) -> Vec<StaticBinding> {
        match catalog.list_bindings().await {
            Ok(bindings) => bindings,
            Err(e) => {
                warn!(error = %e, "Bindings unavailable, matching without them");
                Vec::new()
            }
        }
    }

    /// Every stored file with its inferred owner.
    pub async fn list_files(&self, catalog: &dyn CatalogStore) -> Result<Vec<FileEntry>> {
        let items = match catalog.list_items().await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Catalog unavailable, listing files without items");
                Vec::new()
            }
        };
        let bindings = self.bindings_or_empty(catalog).await;
        let by_id: HashMap<i64, &Item> = items.iter().map(|i| (i.item_id, i)).collect();
        let matcher = self.matcher();

        let entries = self
            .files()
            .await?
            .into_iter()
            .map(|file| {
                let item_id = matcher.predict_item_id(
                    &file.relative_path,
                    &file.file_name,
                    &items,
                    &bindings,
                );
                let item = item_id.and_then(|id| by_id.get(&id));
                FileEntry {
                    path: file.relative_path,
                    file_name: file.file_name,
                    item_id,
                    item_name: item.map(|i| i.name.clone()),
                    category: item.map(|i| i.category.clone()),
                    item_type: item.map(|i| i.item_type.clone()),
                }
            })
            .collect();
        Ok(entries)
    }

    /// Reconcile every stored file against the catalog, upserting bindings.
    pub async fn sync_all(&self, catalog: &dyn CatalogStore) -> Result<SyncReport> {
        let items = catalog.list_items().await?;
        self.sync_with_items(catalog, &items).await
    }

    /// Create the `{category}/{type}` directory of every catalog item, then sync.
    pub async fn sync_structure(&self, catalog: &dyn CatalogStore) -> Result<StructureReport> {
        let items = catalog.list_items().await?;
        let mut directories_created: Vec<String> = Vec::new();

        for item in &items {
            let (category, item_type) = match item.placement() {
                Ok(placement) => placement,
                Err(_) => {
                    debug!(item_id = item.item_id, "Item has no placement, skipping");
                    continue;
                }
            };
            let dir = match self.resolver().directory_for(category, item_type) {
                Ok(dir) => dir,
                Err(e) => {
                    warn!(item_id = item.item_id, error = %e, "Item placement rejected");
                    continue;
                }
            };
            if tokio::fs::try_exists(&dir).await? {
                continue;
            }
            self.resolver().resolve(category, item_type).await?;
            directories_created.push(format!("{}/{}", category, item_type));
        }

        let sync = self.sync_with_items(catalog, &items).await?;
        info!(
            file_count = sync.total,
            directories = directories_created.len(),
            "Structure synchronized"
        );
        Ok(StructureReport {
            directories_created,
            sync,
        })
    }

    async fn sync_with_items(
        &self,
        catalog: &dyn CatalogStore,
        items: &[Item],
    ) -> Result<SyncReport> {
        let bindings = self.bindings_or_empty(catalog).await;
        let matcher = self.matcher();
        let mut report = SyncReport::default();

        for file in self.files().await? {
            let path = file.relative_path;
            let Some(item_id) =
                matcher.predict_item_id(&path, &file.file_name, items, &bindings)
            else {
                trace!(path = %path, "No owning item");
                report.push(SyncEntry {
                    path,
                    item_id: None,
                    static_path: None,
                    status: SyncStatus::NoItemId,
                    error: None,
                });
                continue;
            };

            let static_path = self.static_path(&path);
            let entry = match catalog.upsert_binding(item_id, &static_path).await {
                Ok(()) => SyncEntry {
                    path,
                    item_id: Some(item_id),
                    static_path: Some(static_path),
                    status: SyncStatus::Updated,
                    error: None,
                },
                Err(e) => {
                    let status = match e {
                        Error::UpstreamRejected { .. } => SyncStatus::UpdateFailed,
                        _ => SyncStatus::Error,
                    };
                    warn!(item_id, path = %path, error = %e, "Binding sync failed");
                    SyncEntry {
                        path,
                        item_id: Some(item_id),
                        static_path: None,
                        status,
                        error: Some(e.to_string()),
                    }
                }
            };
            report.push(entry);
        }

        info!(
            file_count = report.total,
            updated = report.updated,
            "Static bindings synchronized"
        );
        Ok(report)
    }
}
