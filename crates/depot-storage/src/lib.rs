//! # depot-storage
//!
//! The filesystem side of depot: the storage tree handle, the Archive
//! Ingestor (single files, zip, file lists and streamed tar), the
//! Static-Binding Synchronizer, browsing and folder download, and the backup
//! and crash-safe restore pipelines used by the operation tracker.

pub mod backup;
pub mod browse;
pub mod config;
pub mod ingest;
pub mod restore;
pub mod storage;
pub mod sync;

pub use backup::{archive_prefix, backup_to_file, backup_to_vec, BackupSummary};
pub use browse::{mime_for, Browse, BrowseEntry, BrowseListing, EntryKind};
pub use config::StorageConfig;
pub use ingest::{
    discover_payload_root, FolderPayload, FolderUpload, ListedFile, SingleUpload,
};
pub use restore::{restore_from_archive, RestoreSummary};
pub use storage::Storage;
pub use sync::StructureReport;
