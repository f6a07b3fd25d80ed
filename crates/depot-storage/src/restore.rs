//! Crash-safe restore of the storage tree from a backup archive.
//!
//! Pipeline:
//! 1. open the archive (a bad archive fails before the tree is touched)
//! 2. copy the live tree to `{safety_dir}/pre_restore_{timestamp}`
//! 3. empty the live tree, keeping the root directory itself
//! 4. extract entries under `{root_name}/`, ignoring everything else
//! 5. on failure, empty the tree again and copy the pre-restore tree back
//!
//! If the rollback itself fails the tree is left as-is and an error is logged.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use depot_core::defaults::TIMESTAMP_FORMAT;
use depot_core::{safe_relative_path, Error, Result};

use crate::backup::archive_prefix;
use crate::storage::walk_error;

/// What a completed restore did.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreSummary {
    pub files_restored: usize,
    /// Archive entries outside the storage-root prefix.
    pub entries_skipped: usize,
    pub safety_copy: PathBuf,
}

/// Recursively copy the contents of `from` into `to`.
pub fn copy_tree(from: &Path, to: &Path) -> Result<usize> {
    fs::create_dir_all(to)?;
    let mut files = 0usize;
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(walk_error)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::Internal(e.to_string()))?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            files += 1;
        }
    }
    Ok(files)
}

/// Remove everything inside `dir`, keeping `dir`.
pub fn empty_dir(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn extract_prefixed(
    archive: &mut ZipArchive<File>,
    prefix: &str,
    root: &Path,
) -> Result<(usize, usize)> {
    let marker = format!("{}/", prefix);
    let mut restored = 0usize;
    let mut skipped = 0usize;

    for idx in 0..archive.len() {
        let mut entry = archive
            .by_index(idx)
            .map_err(|e| Error::Archive(e.to_string()))?;
        let Some(inner) = entry.name().strip_prefix(&marker).map(str::to_string) else {
            skipped += 1;
            continue;
        };
        let relative = match safe_relative_path(&inner) {
            Ok(p) => p,
            Err(_) => {
                warn!(path = entry.name(), "Skipping restore entry outside the archive root");
                skipped += 1;
                continue;
            }
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = root.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| Error::Archive(format!("{}: {}", inner, e)))?;
        restored += 1;
    }
    Ok((restored, skipped))
}

/// Canonical form of `path`, resolved through its nearest existing ancestor
/// so nothing has to be created first.
fn resolve_existing(path: &Path) -> Result<PathBuf> {
    let mut missing = Vec::new();
    let mut current = path;
    loop {
        match current.canonicalize() {
            Ok(resolved) => {
                return Ok(missing.into_iter().rev().fold(resolved, |acc, part| acc.join(part)));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (current.parent(), current.file_name()) else {
                    return Err(e.into());
                };
                missing.push(name.to_os_string());
                current = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Replace the tree at `root` with the contents of the backup at `archive_path`.
pub fn restore_from_archive(
    root: &Path,
    archive_path: &Path,
    safety_dir: &Path,
) -> Result<RestoreSummary> {
    let started = Instant::now();
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| Error::Archive(e.to_string()))?;
    let prefix = archive_prefix(root);

    fs::create_dir_all(root)?;
    if resolve_existing(safety_dir)?.starts_with(root.canonicalize()?) {
        return Err(Error::Config(format!(
            "restore safety dir {} is inside the storage root",
            safety_dir.display()
        )));
    }
    fs::create_dir_all(safety_dir)?;
    let safety_copy = safety_dir.join(format!(
        "pre_restore_{}_{}",
        Utc::now().format(TIMESTAMP_FORMAT),
        uuid::Uuid::new_v4().simple()
    ));
    let copied = copy_tree(root, &safety_copy)?;
    info!(path = %safety_copy.display(), file_count = copied, "Pre-restore copy written");

    let outcome = empty_dir(root).and_then(|()| extract_prefixed(&mut archive, &prefix, root));
    match outcome {
        Ok((files_restored, entries_skipped)) => {
            info!(
                file_count = files_restored,
                skipped = entries_skipped,
                duration_ms = started.elapsed().as_millis() as u64,
                "Restore completed"
            );
            Ok(RestoreSummary {
                files_restored,
                entries_skipped,
                safety_copy,
            })
        }
        Err(e) => {
            warn!(error = %e, "Restore failed, rolling back");
            match empty_dir(root).and_then(|()| copy_tree(&safety_copy, root)) {
                Ok(files) => info!(file_count = files, "Rollback completed"),
                Err(rollback) => error!(
                    error = %rollback,
                    path = %safety_copy.display(),
                    "Rollback failed, storage tree may be incomplete"
                ),
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_and_empty_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("a/b")).unwrap();
        fs::create_dir_all(src.join("empty")).unwrap();
        fs::write(src.join("a/b/f.txt"), b"f").unwrap();
        fs::write(src.join("top.txt"), b"t").unwrap();

        let dst = tmp.path().join("dst");
        assert_eq!(copy_tree(&src, &dst).unwrap(), 2);
        assert_eq!(fs::read(dst.join("a/b/f.txt")).unwrap(), b"f");
        assert!(dst.join("empty").is_dir());

        empty_dir(&src).unwrap();
        assert!(src.is_dir());
        assert_eq!(fs::read_dir(&src).unwrap().count(), 0);
    }

    #[test]
    fn test_restore_rejects_non_zip_without_touching_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("db");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("keep.txt"), b"keep").unwrap();
        let bogus = tmp.path().join("bogus.zip");
        fs::write(&bogus, b"nope").unwrap();

        let err = restore_from_archive(&root, &bogus, &tmp.path().join("safety")).unwrap_err();
        assert!(matches!(err, Error::Archive(_)));
        assert_eq!(fs::read(root.join("keep.txt")).unwrap(), b"keep");
        assert!(!tmp.path().join("safety").exists());
    }
}
