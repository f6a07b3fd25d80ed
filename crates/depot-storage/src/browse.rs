//! Read side: directory browsing and folder-to-zip.

use std::fs::{self, File};
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use depot_core::{relative_path_string, Error, Result};

use crate::storage::{blocking, is_transient, walk_error, Storage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowseEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub size: u64,
    pub is_parent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowseListing {
    pub current_path: String,
    pub items: Vec<BrowseEntry>,
    pub total: usize,
}

/// What a browse path points at.
#[derive(Debug)]
pub enum Browse {
    Directory(BrowseListing),
    File(PathBuf),
}

/// MIME type guessed from the file extension.
pub fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn list_directory(full: &Path, current_path: &str) -> Result<BrowseListing> {
    let mut items = Vec::new();

    if !current_path.is_empty() {
        let parent = Path::new(current_path)
            .parent()
            .map(relative_path_string)
            .unwrap_or_default();
        items.push(BrowseEntry {
            name: "..".to_string(),
            path: parent,
            kind: EntryKind::Directory,
            size: 0,
            is_parent: true,
            extension: None,
            mimetype: None,
        });
    }

    let mut children = Vec::new();
    for entry in fs::read_dir(full)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_transient(&name) {
            continue;
        }
        let metadata = entry.metadata()?;
        let path = if current_path.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", current_path, name)
        };

        let entry = if metadata.is_dir() {
            BrowseEntry {
                name,
                path,
                kind: EntryKind::Directory,
                size: 0,
                is_parent: false,
                extension: None,
                mimetype: None,
            }
        } else {
            let extension = Path::new(&name)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            BrowseEntry {
                mimetype: Some(mime_for(&entry.path())),
                extension: Some(extension),
                name,
                path,
                kind: EntryKind::File,
                size: metadata.len(),
                is_parent: false,
            }
        };
        children.push(entry);
    }

    children.sort_by(|a, b| {
        let rank = |e: &BrowseEntry| match e.kind {
            EntryKind::Directory => 0,
            EntryKind::File => 1,
        };
        rank(a).cmp(&rank(b)).then_with(|| a.name.cmp(&b.name))
    });
    items.extend(children);

    Ok(BrowseListing {
        current_path: current_path.to_string(),
        total: items.len(),
        items,
    })
}

/// Zip `folder` with entry names relative to it. Returns the number of files.
pub fn write_folder_zip<W: Write + io::Seek>(folder: &Path, writer: W) -> Result<usize> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut files = 0usize;

    let walker = WalkDir::new(folder)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_transient(&e.file_name().to_string_lossy()));
    for entry in walker {
        let entry = entry.map_err(walk_error)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .strip_prefix(folder)
            .map(relative_path_string)
            .map_err(|e| Error::Internal(e.to_string()))?;
        zip.start_file(name, options)
            .map_err(|e| Error::Internal(e.to_string()))?;
        let mut source = File::open(entry.path())?;
        io::copy(&mut source, &mut zip)?;
        files += 1;
    }

    zip.finish().map_err(|e| Error::Internal(e.to_string()))?;
    Ok(files)
}

impl Storage {
    /// Browse a directory, or point at the file when `raw` names one.
    pub async fn browse(&self, raw: &str) -> Result<Browse> {
        let full = self.resolve_existing(raw).await?;
        if tokio::fs::metadata(&full).await?.is_file() {
            return Ok(Browse::File(full));
        }
        let current_path = self.relative(&full)?;
        blocking(move || list_directory(&full, &current_path)).await
            .map(Browse::Directory)
    }

    /// Existing regular file under the root.
    pub async fn file(&self, raw: &str) -> Result<PathBuf> {
        let full = self.resolve_existing(raw).await?;
        if !tokio::fs::metadata(&full).await?.is_file() {
            return Err(Error::NotFound(format!("File not found: {}", raw)));
        }
        Ok(full)
    }

    /// Zip a stored folder in memory. Returns `(folder_name, zip_bytes)`.
    pub async fn zip_folder(&self, raw: &str) -> Result<(String, Vec<u8>)> {
        let full = self.resolve_existing(raw).await?;
        if !tokio::fs::metadata(&full).await?.is_dir() {
            return Err(Error::NotFound(format!("Folder not found: {}", raw)));
        }
        let folder_name = full
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "storage".to_string());

        let (files, bytes) = blocking(move || {
            let mut cursor = Cursor::new(Vec::new());
            let files = write_folder_zip(&full, &mut cursor)?;
            Ok((files, cursor.into_inner()))
        })
        .await?;
        debug!(path = raw, file_count = files, bytes = bytes.len(), "Folder zipped");
        Ok((folder_name, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    fn fixture() -> (tempfile::TempDir, Storage) {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("db");
        fs::create_dir_all(root.join("docs/pdf/sub")).unwrap();
        fs::create_dir_all(root.join("docs/aaa")).unwrap();
        fs::write(root.join("docs/pdf/b.PDF"), b"bbbb").unwrap();
        fs::write(root.join("docs/pdf/a.txt"), b"aa").unwrap();
        fs::write(root.join("docs/pdf/sub/c.json"), b"{}").unwrap();
        let storage = Storage::new(&StorageConfig::default().with_root(&root));
        (tmp, storage)
    }

    #[tokio::test]
    async fn test_browse_root_has_no_parent_entry() {
        let (_tmp, storage) = fixture();
        let Browse::Directory(listing) = storage.browse("").await.unwrap() else {
            panic!("expected a directory");
        };
        assert_eq!(listing.current_path, "");
        assert_eq!(listing.total, 1);
        assert_eq!(listing.items[0].name, "docs");
        assert!(!listing.items[0].is_parent);
    }

    #[tokio::test]
    async fn test_browse_orders_parent_dirs_files() {
        let (_tmp, storage) = fixture();
        let Browse::Directory(listing) = storage.browse("docs/pdf").await.unwrap() else {
            panic!("expected a directory");
        };

        let names: Vec<_> = listing.items.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["..", "sub", "a.txt", "b.PDF"]);
        assert_eq!(listing.items[0].path, "docs");
        assert!(listing.items[0].is_parent);
        assert_eq!(listing.items[1].path, "docs/pdf/sub");

        let pdf = &listing.items[3];
        assert_eq!(pdf.kind, EntryKind::File);
        assert_eq!(pdf.size, 4);
        assert_eq!(pdf.extension.as_deref(), Some("pdf"));
        assert_eq!(pdf.mimetype.as_deref(), Some("application/pdf"));
        assert_eq!(listing.total, 4);
    }

    #[tokio::test]
    async fn test_browse_file_and_traversal() {
        let (_tmp, storage) = fixture();
        assert!(matches!(
            storage.browse("docs/pdf/a.txt").await.unwrap(),
            Browse::File(_)
        ));
        assert!(matches!(
            storage.browse("../etc").await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            storage.browse("nope").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_zip_folder_uses_relative_names() {
        let (_tmp, storage) = fixture();
        let (name, bytes) = storage.zip_folder("docs/pdf").await.unwrap();
        assert_eq!(name, "pdf");

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<_> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.PDF", "sub/c.json"]);
    }

    #[tokio::test]
    async fn test_file_rejects_directories() {
        let (_tmp, storage) = fixture();
        assert!(storage.file("docs/pdf/a.txt").await.is_ok());
        assert!(matches!(storage.file("docs").await, Err(Error::NotFound(_))));
    }
}
