//! Path Resolver: maps item metadata onto the storage tree.
//!
//! Layout is `{root}/{category}/{type}/[subfolder/]filename`. Directory
//! creation is create-if-absent, so concurrent resolves of the same item are
//! safe.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::defaults::TIMESTAMP_FORMAT;
use crate::error::Result;
use crate::file_safety::{checked_segment, sanitize_filename, split_extension};
use crate::models::Item;

/// Resolves item placement under a storage root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{category}/{type}` without touching the filesystem.
    pub fn directory_for(&self, category: &str, item_type: &str) -> Result<PathBuf> {
        let category = checked_segment(category)?;
        let item_type = checked_segment(item_type)?;
        Ok(self.root.join(category).join(item_type))
    }

    /// Resolve and create the directory for `(category, type)`.
    pub async fn resolve(&self, category: &str, item_type: &str) -> Result<PathBuf> {
        let dir = self.directory_for(category, item_type)?;
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Resolve and create the directory an item's files are placed in.
    pub async fn resolve_item(&self, item: &Item) -> Result<PathBuf> {
        let (category, item_type) = item.placement()?;
        self.resolve(category, item_type).await
    }

    /// Name of the per-upload folder: `{sanitized_item_name}_{item_id}_{timestamp}`,
    /// with the name lowercased.
    pub fn upload_folder_name(item: &Item, at: DateTime<Utc>) -> String {
        format!(
            "{}_{}_{}",
            sanitize_filename(&item.name).to_lowercase(),
            item.item_id,
            at.format(TIMESTAMP_FORMAT)
        )
    }
}

/// Return a path in `directory` named `base_name` that does not exist yet.
///
/// On collision, `_1`, `_2`, ... is inserted before the extension. Existing
/// files are never overwritten.
pub async fn resolve_collision(directory: &Path, base_name: &str) -> Result<PathBuf> {
    let candidate = directory.join(base_name);
    if !tokio::fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }

    let (stem, ext) = split_extension(base_name);
    let mut counter: u64 = 1;
    loop {
        let candidate = directory.join(format!("{}_{}{}", stem, counter, ext));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_resolve_creates_directories_idempotently() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(tmp.path());

        let dir = resolver.resolve("docs", "pdf").await.unwrap();
        assert_eq!(dir, tmp.path().join("docs").join("pdf"));
        assert!(dir.is_dir());

        let again = resolver.resolve("docs", "pdf").await.unwrap();
        assert_eq!(dir, again);
    }

    #[tokio::test]
    async fn test_resolve_rejects_bad_segments() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(tmp.path());

        assert!(matches!(
            resolver.resolve("", "pdf").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            resolver.resolve("..", "pdf").await,
            Err(Error::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_item_requires_placement() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(tmp.path());
        let item = Item::new(1, "docs", "", "x");

        assert!(resolver.resolve_item(&item).await.is_err());
        assert!(!tmp.path().join("docs").exists());
    }

    #[tokio::test]
    async fn test_resolve_collision_appends_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();

        let first = resolve_collision(dir, "report.pdf").await.unwrap();
        assert_eq!(first, dir.join("report.pdf"));
        std::fs::write(&first, b"a").unwrap();

        let second = resolve_collision(dir, "report.pdf").await.unwrap();
        assert_eq!(second, dir.join("report_1.pdf"));
        std::fs::write(&second, b"b").unwrap();

        let third = resolve_collision(dir, "report.pdf").await.unwrap();
        assert_eq!(third, dir.join("report_2.pdf"));
        assert!(!third.exists());

        // Same snapshot, same answer.
        assert_eq!(resolve_collision(dir, "report.pdf").await.unwrap(), third);
    }

    #[tokio::test]
    async fn test_resolve_collision_without_extension() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("notes"), b"x").unwrap();

        let path = resolve_collision(tmp.path(), "notes").await.unwrap();
        assert_eq!(path, tmp.path().join("notes_1"));
    }

    #[test]
    fn test_upload_folder_name() {
        let item = Item::new(42, "docs", "pdf", "Quarterly Report");
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(
            PathResolver::upload_folder_name(&item, at),
            "quarterly_report_42_20240305_140709"
        );
    }
}
