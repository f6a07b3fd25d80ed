//! Storage configuration.

use std::path::{Path, PathBuf};

use depot_core::defaults;

/// Where the storage tree lives and where pre-restore copies go.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
    /// Public view-path prefix prepended to binding paths.
    pub view_prefix: String,
    /// Parent directory of pre-restore copies. Defaults to a sibling of the
    /// root named `{root}_prerestore`.
    pub restore_safety_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(defaults::STORAGE_ROOT),
            view_prefix: defaults::FILE_VIEW_PREFIX.to_string(),
            restore_safety_dir: None,
        }
    }
}

impl StorageConfig {
    /// Read `STORAGE_ROOT`, `FILE_VIEW_PREFIX` and `RESTORE_SAFETY_DIR`.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            root: std::env::var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(base.root),
            view_prefix: std::env::var("FILE_VIEW_PREFIX").unwrap_or(base.view_prefix),
            restore_safety_dir: std::env::var("RESTORE_SAFETY_DIR").ok().map(PathBuf::from),
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_view_prefix(mut self, view_prefix: impl Into<String>) -> Self {
        self.view_prefix = view_prefix.into();
        self
    }

    pub fn with_restore_safety_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.restore_safety_dir = Some(dir.into());
        self
    }

    /// Effective pre-restore directory.
    pub fn safety_dir(&self) -> PathBuf {
        if let Some(dir) = &self.restore_safety_dir {
            return dir.clone();
        }
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| defaults::STORAGE_ROOT.to_string());
        let parent = self.root.parent().unwrap_or_else(|| Path::new(""));
        parent.join(format!("{}_prerestore", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_dir_defaults_to_sibling() {
        let config = StorageConfig::default().with_root("/srv/depot/db");
        assert_eq!(config.safety_dir(), PathBuf::from("/srv/depot/db_prerestore"));

        let config = StorageConfig::default();
        assert_eq!(config.safety_dir(), PathBuf::from("db_prerestore"));
    }

    #[test]
    fn test_safety_dir_override() {
        let config = StorageConfig::default().with_restore_safety_dir("/var/backups");
        assert_eq!(config.safety_dir(), PathBuf::from("/var/backups"));
    }
}
