//! Core data models for depot.
//!
//! These types are shared across all depot crates: the catalog entities owned
//! by the upstream metadata service, the reports produced by the storage layer,
//! and the operation records tracked for backup/restore.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

/// Treat an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// CATALOG TYPES
// =============================================================================

/// Catalog entry owned by the external metadata service. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub item_type: String,
    #[serde(default)]
    pub details: Option<String>,
}

impl Item {
    pub fn new(
        item_id: i64,
        category: impl Into<String>,
        item_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            item_id,
            category: category.into(),
            name: name.into(),
            item_type: item_type.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// The `(category, type)` pair a file for this item is placed under.
    ///
    /// Fails with `InvalidInput` when either segment is blank, so no write can
    /// happen for an item that has no valid placement.
    pub fn placement(&self) -> Result<(&str, &str)> {
        let category = self.category.trim();
        let item_type = self.item_type.trim();
        if category.is_empty() || item_type.is_empty() {
            return Err(Error::InvalidInput(
                "Invalid item details: missing category or type".to_string(),
            ));
        }
        Ok((category, item_type))
    }
}

/// Recorded storage path of an item's primary file.
///
/// At most one binding exists per item; an upsert replaces the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticBinding {
    pub item_id: i64,
    #[serde(default)]
    pub item_path: Option<String>,
}

impl StaticBinding {
    pub fn new(item_id: i64, item_path: impl Into<String>) -> Self {
        Self {
            item_id,
            item_path: Some(item_path.into()),
        }
    }
}

/// Body of `PUT /items/static/update/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingUpdate {
    pub item_path: String,
}

// =============================================================================
// STORAGE REPORTS
// =============================================================================

/// A file under the storage root. Its owning item is inferred, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Path relative to the storage root, `/`-separated.
    pub relative_path: String,
    pub file_name: String,
    pub absolute_path: std::path::PathBuf,
}

/// One stored file as reported by `GET /files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub file_name: String,
    pub item_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
}

/// A file written by an upload, with the outcome of its binding upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_path: String,
    pub static_path: Option<String>,
    pub updated: bool,
}

/// Per-file outcome of a synchronization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Binding upserted.
    Updated,
    /// Upstream answered with a non-success status.
    UpdateFailed,
    /// Upstream could not be reached.
    Error,
    /// No owning item could be inferred.
    NoItemId,
}

/// One line of a synchronization report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEntry {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_path: Option<String>,
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of reconciling the storage tree against the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub files: Vec<SyncEntry>,
    pub total: usize,
    pub updated: usize,
}

impl SyncReport {
    pub fn push(&mut self, entry: SyncEntry) {
        if entry.status == SyncStatus::Updated {
            self.updated += 1;
        }
        self.total += 1;
        self.files.push(entry);
    }

    pub fn count(&self, status: SyncStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }
}

// =============================================================================
// OPERATION TYPES
// =============================================================================

/// Kind of tracked background operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Backup,
    Restore,
    RestoreChunked,
}

/// Lifecycle state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    InProgress,
    ReceivingChunks,
    Processing,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Backup: `in_progress -> completed|failed`.
    /// Restore: `in_progress|receiving_chunks -> processing -> completed|failed`.
    pub fn can_transition_to(self, next: OperationStatus) -> bool {
        use OperationStatus::*;
        match self {
            InProgress => matches!(next, Processing | Completed | Failed),
            ReceivingChunks => matches!(next, Processing | Failed),
            Processing => matches!(next, Completed | Failed),
            Completed | Failed => false,
        }
    }
}

/// Status record of a backup/restore operation, as returned by `GET /operation/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation_id: String,
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    pub status: OperationStatus,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub chunks_received: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set once the retention window elapsed and the backing files were removed.
    #[serde(default)]
    pub files_expired: bool,
}

impl OperationRecord {
    pub fn new(operation_id: String, operation_type: OperationType, status: OperationStatus) -> Self {
        Self {
            operation_id,
            operation_type,
            status,
            start_time: Utc::now(),
            completed_at: None,
            chunks_received: 0,
            total_chunks: None,
            file_path: None,
            progress_message: None,
            result: None,
            error: None,
            files_expired: false,
        }
    }

    /// Move to `next`, stamping `completed_at` on terminal states.
    pub fn transition(&mut self, next: OperationStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidInput(format!(
                "operation {} cannot move from {:?} to {:?}",
                self.operation_id, self.status, next
            )));
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn all_chunks_received(&self) -> bool {
        matches!(self.total_chunks, Some(total) if self.chunks_received >= total)
    }
}
