//! Backup archives of the whole storage tree.
//!
//! Entries are prefixed with the root directory name (`db/docs/pdf/a.pdf`),
//! directories included so empty ones survive a restore.

use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use depot_core::{defaults, relative_path_string, Error, Result};

use crate::storage::{is_transient, walk_error};

/// What went into a backup archive.
#[derive(Debug, Clone, Serialize)]
pub struct BackupSummary {
    pub file_count: usize,
    /// Uncompressed bytes of the stored files.
    pub bytes: u64,
    /// Size of the archive itself.
    pub archive_bytes: u64,
    pub sha256: String,
}

/// Prefix under which the tree is stored in backup archives.
pub fn archive_prefix(root: &Path) -> String {
    root.canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .or_else(|| root.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| defaults::STORAGE_ROOT.to_string())
}

fn zip_error(e: zip::result::ZipError) -> Error {
    Error::Internal(format!("zip write failed: {}", e))
}

/// Write a zip of `root` to `writer`. Returns `(file_count, bytes)`.
pub fn write_backup<W: Write + Seek>(root: &Path, writer: W) -> Result<(usize, u64)> {
    let prefix = archive_prefix(root);
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut file_count = 0usize;
    let mut bytes = 0u64;

    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_transient(&e.file_name().to_string_lossy()));
    for entry in walker {
        let entry = entry.map_err(walk_error)?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map(relative_path_string)
            .map_err(|e| Error::Internal(e.to_string()))?;
        let name = format!("{}/{}", prefix, relative);

        if entry.file_type().is_dir() {
            zip.add_directory(name, options).map_err(zip_error)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options).map_err(zip_error)?;
            let mut source = File::open(entry.path())?;
            bytes += io::copy(&mut source, &mut zip)?;
            file_count += 1;
        }
    }

    zip.finish().map_err(zip_error)?;
    Ok((file_count, bytes))
}

/// Hex SHA-256 of everything `reader` yields.
pub fn sha256_hex<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Build a backup zip in memory.
pub fn backup_to_vec(root: &Path) -> Result<(Vec<u8>, BackupSummary)> {
    let mut cursor = io::Cursor::new(Vec::new());
    let (file_count, bytes) = write_backup(root, &mut cursor)?;
    let data = cursor.into_inner();
    let summary = BackupSummary {
        file_count,
        bytes,
        archive_bytes: data.len() as u64,
        sha256: hex::encode(Sha256::digest(&data)),
    };
    Ok((data, summary))
}

/// Build a backup zip at `target`.
pub fn backup_to_file(root: &Path, target: &Path) -> Result<BackupSummary> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(target)?;
    let (file_count, bytes) = write_backup(root, file)?;
    let archive_bytes = std::fs::metadata(target)?.len();
    let sha256 = sha256_hex(File::open(target)?)?;
    Ok(BackupSummary {
        file_count,
        bytes,
        archive_bytes,
        sha256,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_entries_are_prefixed() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("db");
        std::fs::create_dir_all(root.join("docs/pdf")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::write(root.join("docs/pdf/a.pdf"), b"abc").unwrap();

        let (data, summary) = backup_to_vec(&root).unwrap();
        assert_eq!(summary.file_count, 1);
        assert_eq!(summary.bytes, 3);
        assert_eq!(summary.archive_bytes, data.len() as u64);
        assert_eq!(summary.sha256.len(), 64);

        let mut archive = zip::ZipArchive::new(io::Cursor::new(data)).unwrap();
        let names: Vec<_> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"db/docs/pdf/a.pdf".to_string()));
        assert!(names.contains(&"db/empty/".to_string()));
    }

    #[test]
    fn test_backup_to_file_checksum_matches() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("db");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("x.txt"), b"hello").unwrap();

        let target = tmp.path().join("ops/backup.zip");
        let summary = backup_to_file(&root, &target).unwrap();
        let data = std::fs::read(&target).unwrap();
        assert_eq!(summary.sha256, hex::encode(Sha256::digest(&data)));
    }

    #[test]
    fn test_archive_prefix_uses_root_name() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("storage");
        std::fs::create_dir_all(&root).unwrap();
        assert_eq!(archive_prefix(&root), "storage");
    }
}
