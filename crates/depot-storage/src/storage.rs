//! Storage root handle.
//!
//! All filesystem access from the other modules goes through [`Storage`],
//! which owns the root, the path resolver and the public view prefix.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use depot_core::defaults::{STAGING_PREFIX, UPLOAD_TEMP_PREFIX};
use depot_core::{
    relative_path_string, safe_relative_path, CatalogStore, Error, PathResolver, Result,
    StoredFile,
};

use crate::config::StorageConfig;

/// Map a walkdir failure onto the storage error type.
pub(crate) fn walk_error(e: walkdir::Error) -> Error {
    Error::Io(e.into())
}

/// Run blocking filesystem work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("blocking task failed: {}", e)))?
}

/// Entries that belong to in-flight uploads and are invisible to readers.
pub(crate) fn is_transient(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX) || name.starts_with(UPLOAD_TEMP_PREFIX)
}

/// Every regular file under `root`, sorted by path.
pub(crate) fn walk_files(root: &Path) -> Result<Vec<StoredFile>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_transient(&e.file_name().to_string_lossy()));

    for entry in walker {
        let entry = entry.map_err(walk_error)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| Error::Internal(e.to_string()))?;
        files.push(StoredFile {
            relative_path: relative_path_string(relative),
            file_name: entry.file_name().to_string_lossy().into_owned(),
            absolute_path: entry.path().to_path_buf(),
        });
    }
    Ok(files)
}

/// Handle on the storage tree.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    resolver: PathResolver,
    view_prefix: String,
    safety_dir: PathBuf,
}

impl Storage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.root.clone(),
            resolver: PathResolver::new(config.root.clone()),
            view_prefix: config.view_prefix.clone(),
            safety_dir: config.safety_dir(),
        }
    }

    /// Build the handle and make sure the root exists.
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.root).await?;
        info!(path = %config.root.display(), "Storage root ready");
        Ok(Self::new(config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn view_prefix(&self) -> &str {
        &self.view_prefix
    }

    pub fn safety_dir(&self) -> &Path {
        &self.safety_dir
    }

    /// Public binding path of a stored file.
    pub fn static_path(&self, relative_path: &str) -> String {
        format!("{}{}", self.view_prefix, relative_path)
    }

    /// `/`-separated path of `absolute` relative to the root.
    pub fn relative(&self, absolute: &Path) -> Result<String> {
        let relative = absolute
            .strip_prefix(&self.root)
            .map_err(|_| Error::Forbidden(format!("{} is outside storage", absolute.display())))?;
        Ok(relative_path_string(relative))
    }

    /// Resolve a caller-supplied path to an existing entry under the root.
    pub async fn resolve_existing(&self, raw: &str) -> Result<PathBuf> {
        let relative = safe_relative_path(raw)?;
        let full = self.root.join(relative);
        if !tokio::fs::try_exists(&full).await? {
            return Err(Error::NotFound(format!("Path not found: {}", raw)));
        }
        Ok(full)
    }

    /// Every stored file, sorted by path.
    pub async fn files(&self) -> Result<Vec<StoredFile>> {
        let root = self.root.clone();
        blocking(move || walk_files(&root)).await
    }

    /// Upsert the binding of `item_id` to the file at `relative_path`.
    ///
    /// Failures are logged and reported as `None`; they never fail the caller.
    pub(crate) async fn bind(
        &self,
        catalog: &dyn CatalogStore,
        item_id: i64,
        relative_path: &str,
    ) -> Option<String> {
        let static_path = self.static_path(relative_path);
        match catalog.upsert_binding(item_id, &static_path).await {
            Ok(()) => Some(static_path),
            Err(e) => {
                warn!(item_id, path = relative_path, error = %e, "Binding update failed");
                None
            }
        }
    }
}
