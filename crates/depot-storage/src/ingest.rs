//! Archive Ingestor.
//!
//! Single files are written to a temporary name in the item directory and
//! renamed into place. Folder payloads (zip, file list, streamed tar) are
//! unpacked into a staging directory next to the destination, reduced to
//! their payload root, then moved into a fresh per-upload folder. The staging
//! directory is removed whatever the outcome.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use flate2::read::GzDecoder;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;
use zip::ZipArchive;

use depot_core::defaults::{STAGING_PREFIX, UPLOAD_TEMP_PREFIX};
use depot_core::{
    resolve_collision, safe_relative_path, sanitize_filename, split_extension, CatalogStore,
    Error, Item, PathResolver, Result, UploadedFile,
};

use crate::storage::{blocking, walk_files, Storage};

/// A file of a multi-file folder upload, already spooled to disk.
#[derive(Debug, Clone)]
pub struct ListedFile {
    /// Path inside the uploaded folder, as sent by the client.
    pub relative_path: String,
    pub source: PathBuf,
}

/// Folder upload body, decided at the HTTP boundary.
#[derive(Debug, Clone)]
pub enum FolderPayload {
    /// A zip archive spooled to disk.
    Zip { archive: PathBuf },
    /// Individual files with their relative paths.
    FileList(Vec<ListedFile>),
}

/// Outcome of a single-file upload.
#[derive(Debug, Clone, Serialize)]
pub struct SingleUpload {
    pub original_filename: String,
    pub new_filename: String,
    /// Path relative to the storage root.
    pub path: String,
    pub static_path: String,
    pub binding_updated: bool,
}

/// Outcome of a folder upload.
#[derive(Debug, Clone, Serialize)]
pub struct FolderUpload {
    /// Folder path relative to the storage root.
    pub folder_path: String,
    pub files: Vec<UploadedFile>,
}

// =============================================================================
// ROOT DISCOVERY
// =============================================================================

fn list_dir(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

/// Locate the payload root of an unpacked archive.
///
/// When `staging` holds exactly one entry and it is a directory, descend into
/// it and keep descending while the current directory holds exactly one
/// entry that is itself a directory. Otherwise `staging` is the payload root.
pub fn discover_payload_root(staging: &Path) -> io::Result<PathBuf> {
    let top = list_dir(staging)?;
    if top.len() != 1 || !top[0].is_dir() {
        return Ok(staging.to_path_buf());
    }

    let mut current = top[0].clone();
    loop {
        let entries = list_dir(&current)?;
        match entries.as_slice() {
            [only] if only.is_dir() => current = only.clone(),
            _ => return Ok(current),
        }
    }
}

/// Move every entry of the payload root found in `staging` into `destination`.
fn materialize(staging: &Path, destination: &Path) -> Result<()> {
    let root = discover_payload_root(staging)?;
    debug!(
        path = %root.strip_prefix(staging).unwrap_or(&root).display(),
        "Payload root resolved"
    );
    for entry in list_dir(&root)? {
        if let Some(name) = entry.file_name() {
            fs::rename(&entry, destination.join(name))?;
        }
    }
    Ok(())
}

// =============================================================================
// UNPACKERS (blocking)
// =============================================================================

fn archive_error(e: impl std::fmt::Display) -> Error {
    Error::Archive(e.to_string())
}

/// Unpack a (possibly gzip-compressed) tar stream into `staging`.
///
/// Returns the number of regular files written.
pub fn unpack_tar<R: Read>(reader: R, staging: &Path) -> Result<usize> {
    let mut reader = BufReader::new(reader);
    let head = reader.fill_buf().map_err(archive_error)?;
    if head.is_empty() {
        return Err(Error::Archive("empty archive stream".to_string()));
    }

    match infer::get(head).map(|kind| kind.mime_type()) {
        Some("application/gzip") => unpack_tar_entries(GzDecoder::new(reader), staging),
        Some(
            mime @ ("application/x-bzip2"
            | "application/x-xz"
            | "application/zstd"
            | "application/x-7z-compressed"
            | "application/zip"),
        ) => Err(Error::Archive(format!(
            "unsupported archive format: {}",
            mime
        ))),
        _ => unpack_tar_entries(reader, staging),
    }
}

fn unpack_tar_entries<R: Read>(reader: R, staging: &Path) -> Result<usize> {
    let mut archive = tar::Archive::new(reader);
    let mut entries_seen = 0usize;
    let mut files = 0usize;

    for entry in archive.entries().map_err(archive_error)? {
        let mut entry = entry.map_err(archive_error)?;
        entries_seen += 1;

        let kind = entry.header().entry_type();
        if !kind.is_file() && !kind.is_dir() {
            trace!(kind = ?kind, "Skipping non-regular tar entry");
            continue;
        }
        let path = entry.path().map_err(archive_error)?.into_owned();
        if !entry.unpack_in(staging).map_err(archive_error)? {
            warn!(path = %path.display(), "Skipping tar entry outside the archive root");
            continue;
        }
        if kind.is_file() {
            files += 1;
            trace!(path = %path.display(), "Unpacked");
        }
    }

    if entries_seen == 0 {
        return Err(Error::Archive("archive contains no entries".to_string()));
    }
    Ok(files)
}

/// Unpack a zip archive into `staging`. Returns the number of files written.
pub fn unpack_zip(archive_path: &Path, staging: &Path) -> Result<usize> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(archive_error)?;
    let mut files = 0usize;

    for idx in 0..archive.len() {
        let mut entry = archive.by_index(idx).map_err(archive_error)?;
        let relative = match safe_relative_path(entry.name()) {
            Ok(p) if !p.as_os_str().is_empty() => p,
            _ => {
                warn!(path = entry.name(), "Skipping zip entry outside the archive root");
                continue;
            }
        };

        let out = staging.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut target = File::create(&out)?;
        io::copy(&mut entry, &mut target).map_err(archive_error)?;
        files += 1;
    }
    Ok(files)
}

// =============================================================================
// INGESTION
// =============================================================================

/// A staging directory that is removed on drop.
struct Staging {
    path: PathBuf,
}

impl Staging {
    async fn create(parent: &Path) -> Result<Self> {
        let path = parent.join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path })
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove staging directory");
            }
        }
    }
}

/// Remove whatever a failed ingestion left in `destination`.
fn clear_dir(destination: &Path) {
    let entries = match fs::read_dir(destination) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to clean destination");
        }
    }
}

impl Storage {
    /// Store one uploaded file for `item`, named after the item.
    ///
    /// The bytes go to a temporary file first and are renamed to
    /// `sanitize(item.name) + extension`, collision-resolved. The binding
    /// upsert is best-effort.
    pub async fn ingest_file<R>(
        &self,
        catalog: &dyn CatalogStore,
        item: &Item,
        original_filename: &str,
        mut reader: R,
    ) -> Result<SingleUpload>
    where
        R: AsyncRead + Unpin,
    {
        if original_filename.trim().is_empty() {
            return Err(Error::InvalidInput("No selected file".to_string()));
        }
        let dir = self.resolver().resolve_item(item).await?;

        let temp = dir.join(format!("{}{}", UPLOAD_TEMP_PREFIX, Uuid::new_v4().simple()));
        let written = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            let bytes = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            Ok::<u64, io::Error>(bytes)
        }
        .await;
        let bytes = match written {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(e.into());
            }
        };

        let sanitized_original = sanitize_filename(original_filename);
        let (_, ext) = split_extension(&sanitized_original);
        let target_name = format!("{}{}", sanitize_filename(&item.name), ext);
        let target = resolve_collision(&dir, &target_name).await?;
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        let relative = self.relative(&target)?;
        let binding = self.bind(catalog, item.item_id, &relative).await;
        info!(item_id = item.item_id, path = %relative, bytes, "File stored");

        Ok(SingleUpload {
            original_filename: original_filename.to_string(),
            new_filename: target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            static_path: self.static_path(&relative),
            path: relative,
            binding_updated: binding.is_some(),
        })
    }

    /// Store a folder upload (zip or file list) for `item`.
    pub async fn ingest_folder(
        &self,
        catalog: &dyn CatalogStore,
        item: &Item,
        payload: FolderPayload,
    ) -> Result<FolderUpload> {
        let (base_dir, destination) = self.create_upload_folder(item).await?;
        let staging = Staging::create(&base_dir).await?;

        let unpacked = match payload {
            FolderPayload::Zip { archive } => {
                let staging_path = staging.path.clone();
                blocking(move || unpack_zip(&archive, &staging_path)).await
            }
            FolderPayload::FileList(files) => stage_file_list(files, &staging.path).await,
        };

        self.finish_folder(catalog, item, staging, unpacked, destination)
            .await
    }

    /// Store a streamed tar (optionally gzip-compressed) for `item`.
    pub async fn ingest_tar_stream<R>(
        &self,
        catalog: &dyn CatalogStore,
        item: &Item,
        reader: R,
    ) -> Result<FolderUpload>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (base_dir, destination) = self.create_upload_folder(item).await?;
        let staging = Staging::create(&base_dir).await?;

        let bridge = SyncIoBridge::new(reader);
        let staging_path = staging.path.clone();
        let unpacked = blocking(move || unpack_tar(bridge, &staging_path)).await;

        self.finish_folder(catalog, item, staging, unpacked, destination)
            .await
    }

    /// `{category}/{type}/{name}_{id}_{timestamp}`, created empty.
    async fn create_upload_folder(&self, item: &Item) -> Result<(PathBuf, PathBuf)> {
        let base_dir = self.resolver().resolve_item(item).await?;
        let folder_name = PathResolver::upload_folder_name(item, Utc::now());
        let destination = resolve_collision(&base_dir, &folder_name).await?;
        tokio::fs::create_dir_all(&destination).await?;
        Ok((base_dir, destination))
    }

    async fn finish_folder(
        &self,
        catalog: &dyn CatalogStore,
        item: &Item,
        staging: Staging,
        unpacked: Result<usize>,
        destination: PathBuf,
    ) -> Result<FolderUpload> {
        let started = Instant::now();
        let moved = match unpacked {
            Ok(count) => {
                debug!(item_id = item.item_id, file_count = count, "Payload unpacked");
                let staging_path = staging.path.clone();
                let dest = destination.clone();
                blocking(move || materialize(&staging_path, &dest)).await
            }
            Err(e) => Err(e),
        };
        drop(staging);

        if let Err(e) = moved {
            let dest = destination.clone();
            let _ = blocking(move || {
                clear_dir(&dest);
                Ok(())
            })
            .await;
            warn!(item_id = item.item_id, error = %e, "Folder ingestion failed");
            return Err(e);
        }

        let folder_path = self.relative(&destination)?;
        let dest = destination.clone();
        let stored = blocking(move || walk_files(&dest)).await?;

        let mut files = Vec::with_capacity(stored.len());
        for file in stored {
            let relative = self.relative(&file.absolute_path)?;
            let static_path = self.bind(catalog, item.item_id, &relative).await;
            files.push(UploadedFile {
                file_path: relative,
                updated: static_path.is_some(),
                static_path,
            });
        }

        info!(
            item_id = item.item_id,
            path = %folder_path,
            file_count = files.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Folder stored"
        );
        Ok(FolderUpload { folder_path, files })
    }
}

/// Copy spooled files into `staging` under their (validated) relative paths.
async fn stage_file_list(files: Vec<ListedFile>, staging: &Path) -> Result<usize> {
    if files.is_empty() {
        return Err(Error::InvalidInput("No folder files uploaded".to_string()));
    }
    let mut count = 0usize;
    for file in files {
        let relative = safe_relative_path(&file.relative_path)?;
        let Some(name) = relative.file_name() else {
            continue;
        };
        let mut target = staging.join(relative.parent().unwrap_or_else(|| Path::new("")));
        tokio::fs::create_dir_all(&target).await?;
        target.push(sanitize_filename(&name.to_string_lossy()));
        tokio::fs::copy(&file.source, &target).await?;
        count += 1;
    }
    Ok(count)
}
