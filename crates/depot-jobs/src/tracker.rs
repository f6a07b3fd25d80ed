//! Background backup/restore runner.
//!
//! Requests create a record and return its id at once; the work runs in a
//! spawned task that owns the record until it reaches a terminal state.
//! Finished operations keep their files for the retention window, then the
//! files are deleted, then the record is dropped after the grace delay.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use depot_core::defaults::{MAX_TOTAL_CHUNKS, TIMESTAMP_FORMAT};
use depot_core::{Error, OperationRecord, OperationStatus, OperationType, Result};
use depot_storage::{backup_to_file, backup_to_vec, restore_from_archive, BackupSummary, Storage};

use crate::chunks::{self, ChunkReceipt, ASSEMBLED_ARCHIVE};
use crate::config::TrackerConfig;
use crate::registry::OperationRegistry;

/// Capacity of the tracker event channel.
const EVENT_CAPACITY: usize = 256;

/// Name of a fully uploaded restore archive inside the operation directory.
const UPLOADED_ARCHIVE: &str = "upload.zip";

/// Event emitted by the operation tracker.
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    /// A record was registered.
    Created {
        operation_id: String,
        operation_type: OperationType,
    },
    /// A restore chunk was stored.
    ChunkReceived {
        operation_id: String,
        chunks_received: u64,
        total_chunks: u64,
    },
    /// The backup or restore pipeline started.
    Processing {
        operation_id: String,
        operation_type: OperationType,
    },
    Completed {
        operation_id: String,
        operation_type: OperationType,
    },
    Failed {
        operation_id: String,
        operation_type: OperationType,
        error: String,
    },
    /// Retention elapsed and the operation files were deleted.
    FilesExpired { operation_id: String },
    /// Grace elapsed and the record was dropped.
    Removed { operation_id: String },
}

/// Owns the registry and runs operations against one storage tree.
#[derive(Clone)]
pub struct OperationTracker {
    registry: OperationRegistry,
    storage: Arc<Storage>,
    config: TrackerConfig,
    events: broadcast::Sender<TrackerEvent>,
    cancel: CancellationToken,
    /// Serializes pipelines that read or replace the whole tree.
    tree_lock: Arc<Mutex<()>>,
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("blocking task failed: {}", e)))?
}

impl OperationTracker {
    pub fn new(storage: Arc<Storage>, config: TrackerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry: OperationRegistry::new(config.temp_dir.clone()),
            storage,
            config,
            events,
            cancel: CancellationToken::new(),
            tree_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Get a receiver for tracker events.
    pub fn events(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    /// Stop accepting operations and cancel pending cleanups. Pipelines that
    /// already started run to completion.
    pub fn shutdown(&self) {
        info!("Operation tracker shutting down");
        self.cancel.cancel();
    }

    pub async fn get(&self, operation_id: &str) -> Result<OperationRecord> {
        self.registry.require(operation_id).await
    }

    fn emit(&self, event: TrackerEvent) {
        let _ = self.events.send(event);
    }

    fn ensure_running(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Internal("operation tracker is shut down".to_string()));
        }
        Ok(())
    }

    async fn register(
        &self,
        operation_type: OperationType,
        status: OperationStatus,
    ) -> Result<OperationRecord> {
        self.ensure_running()?;
        let record = self.registry.create(operation_type, status).await;
        let dir = self.registry.operation_dir(&record.operation_id);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            self.registry.remove(&record.operation_id).await;
            return Err(e.into());
        }
        debug!(operation_id = %record.operation_id, ?operation_type, "Operation registered");
        self.emit(TrackerEvent::Created {
            operation_id: record.operation_id.clone(),
            operation_type,
        });
        Ok(record)
    }

    // =========================================================================
    // BACKUP
    // =========================================================================

    /// Start an asynchronous backup. The archive is written to the operation
    /// directory and fetched through [`download_path`](Self::download_path).
    pub async fn start_backup(&self) -> Result<OperationRecord> {
        let record = self
            .register(OperationType::Backup, OperationStatus::InProgress)
            .await?;
        let tracker = self.clone();
        let operation_id = record.operation_id.clone();
        tokio::spawn(async move {
            tracker.run_backup(operation_id).await;
        });
        Ok(record)
    }

    async fn run_backup(&self, operation_id: String) {
        self.emit(TrackerEvent::Processing {
            operation_id: operation_id.clone(),
            operation_type: OperationType::Backup,
        });
        let target = self.registry.operation_dir(&operation_id).join(format!(
            "backup_{}.zip",
            Utc::now().format(TIMESTAMP_FORMAT)
        ));
        let _ = self
            .registry
            .update(&operation_id, |r| {
                r.file_path = Some(target.to_string_lossy().into_owned());
                r.progress_message = Some("Writing backup archive".to_string());
                Ok(())
            })
            .await;

        let started = Instant::now();
        let root = self.storage.root().to_path_buf();
        let archive = target.clone();
        let outcome = {
            let _guard = self.tree_lock.lock().await;
            run_blocking(move || backup_to_file(&root, &archive)).await
        };
        let outcome = outcome.and_then(|summary| {
            info!(
                operation_id = %operation_id,
                file_count = summary.file_count,
                bytes = summary.archive_bytes,
                duration_ms = started.elapsed().as_millis() as u64,
                "Backup completed"
            );
            Ok(serde_json::to_value(summary)?)
        });
        self.finish(&operation_id, OperationType::Backup, outcome).await;
    }

    /// Build a backup archive in memory without registering an operation.
    /// Waits for any running restore first.
    pub async fn backup_now(&self) -> Result<(Vec<u8>, BackupSummary)> {
        let root = self.storage.root().to_path_buf();
        let started = Instant::now();
        let _guard = self.tree_lock.lock().await;
        let (bytes, summary) = run_blocking(move || backup_to_vec(&root)).await?;
        info!(
            file_count = summary.file_count,
            bytes = summary.archive_bytes,
            duration_ms = started.elapsed().as_millis() as u64,
            "Streaming backup built"
        );
        Ok((bytes, summary))
    }

    /// Path of a completed backup archive.
    pub async fn download_path(&self, operation_id: &str) -> Result<PathBuf> {
        let record = self.registry.require(operation_id).await?;
        if record.operation_type != OperationType::Backup {
            return Err(Error::InvalidInput(format!(
                "Operation {} is not a backup",
                operation_id
            )));
        }
        if record.files_expired {
            return Err(Error::NotFound(format!(
                "Backup file of operation {} has expired",
                operation_id
            )));
        }
        if record.status != OperationStatus::Completed {
            return Err(Error::Conflict(format!(
                "Backup {} is {}",
                operation_id,
                status_label(record.status)
            )));
        }
        record
            .file_path
            .map(PathBuf::from)
            .ok_or_else(|| Error::NotFound(format!("Backup file of operation {}", operation_id)))
    }

    // =========================================================================
    // RESTORE
    // =========================================================================

    /// Spool a full restore archive from `reader`, then restore in the background.
    pub async fn start_restore<R>(&self, mut reader: R) -> Result<OperationRecord>
    where
        R: AsyncRead + Unpin,
    {
        let record = self
            .register(OperationType::Restore, OperationStatus::InProgress)
            .await?;
        let operation_id = record.operation_id.clone();
        let archive = self.registry.operation_dir(&operation_id).join(UPLOADED_ARCHIVE);

        let spooled = async {
            let mut file = tokio::fs::File::create(&archive).await?;
            let bytes = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            Ok::<u64, std::io::Error>(bytes)
        }
        .await;
        match spooled {
            Ok(bytes) => {
                debug!(operation_id = %operation_id, bytes, "Restore archive received")
            }
            Err(e) => {
                let kind = e.kind();
                let message = e.to_string();
                self.finish(&operation_id, OperationType::Restore, Err(e.into()))
                    .await;
                return Err(Error::Io(std::io::Error::new(kind, message)));
            }
        }

        self.registry
            .update(&operation_id, |r| {
                r.file_path = Some(archive.to_string_lossy().into_owned());
                r.transition(OperationStatus::Processing)
            })
            .await?;
        self.spawn_restore(operation_id, OperationType::Restore, archive);
        self.get(&record.operation_id).await
    }

    /// Register a chunked restore expecting `total_chunks` parts.
    pub async fn begin_chunked_restore(&self, total_chunks: u64) -> Result<OperationRecord> {
        if total_chunks == 0 || total_chunks > MAX_TOTAL_CHUNKS {
            return Err(Error::InvalidInput(format!(
                "Total chunks must be between 1 and {}",
                MAX_TOTAL_CHUNKS
            )));
        }
        let record = self
            .register(OperationType::RestoreChunked, OperationStatus::ReceivingChunks)
            .await?;
        let record = self
            .registry
            .update(&record.operation_id, |r| {
                r.total_chunks = Some(total_chunks);
                r.progress_message = Some(format!("Received 0 of {} chunks", total_chunks));
                Ok(r.clone())
            })
            .await?;
        self.watch_upload(record.operation_id.clone());
        Ok(record)
    }

    /// Fail a chunked restore that gains no new chunk during a whole
    /// retention window. The files then go through the usual cleanup.
    fn watch_upload(&self, operation_id: String) {
        let tracker = self.clone();
        tokio::spawn(async move {
            let window = tracker.config.retention;
            let message = format!(
                "Upload abandoned: no chunk received for {}s",
                window.as_secs()
            );
            let mut seen = 0u64;
            loop {
                tokio::select! {
                    _ = tracker.cancel.cancelled() => return,
                    _ = tokio::time::sleep(window) => {}
                }
                let stalled = tracker
                    .registry
                    .update(&operation_id, |r| {
                        if r.status != OperationStatus::ReceivingChunks {
                            return Ok(None);
                        }
                        if r.chunks_received != seen {
                            seen = r.chunks_received;
                            return Ok(Some(false));
                        }
                        r.error = Some(message.clone());
                        r.progress_message = None;
                        r.transition(OperationStatus::Failed)?;
                        Ok(Some(true))
                    })
                    .await;
                match stalled {
                    Ok(Some(false)) => continue,
                    Ok(Some(true)) => break,
                    _ => return,
                }
            }

            warn!(operation_id = %operation_id, chunks_received = seen, "Chunked upload abandoned");
            tracker.emit(TrackerEvent::Failed {
                operation_id: operation_id.clone(),
                operation_type: OperationType::RestoreChunked,
                error: message,
            });
            tracker.schedule_cleanup(operation_id);
        });
    }

    /// Store chunk `index` of a chunked restore. The chunk that completes the
    /// upload triggers assembly and the restore pipeline.
    pub async fn receive_chunk<R>(
        &self,
        operation_id: &str,
        index: u64,
        mut reader: R,
    ) -> Result<ChunkReceipt>
    where
        R: AsyncRead + Unpin,
    {
        self.ensure_running()?;
        chunks::check_chunk(&self.registry, operation_id, index).await?;

        let dir = self.registry.operation_dir(operation_id);
        let part = chunks::chunk_path(&dir, index);
        let staged = chunks::staged_chunk_path(&dir, index);
        let written = async {
            let mut file = tokio::fs::File::create(&staged).await?;
            let bytes = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            Ok::<u64, std::io::Error>(bytes)
        }
        .await;
        let bytes = match written {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&staged).await;
                warn!(operation_id, chunk = index, error = %e, "Chunk upload interrupted");
                return Err(e.into());
            }
        };
        let new_index = !tokio::fs::try_exists(&part).await?;
        tokio::fs::rename(&staged, &part).await?;

        let receipt = chunks::record_chunk(&self.registry, operation_id, new_index).await?;
        debug!(
            operation_id,
            chunk = index,
            bytes,
            chunks_received = receipt.chunks_received,
            total_chunks = receipt.total_chunks,
            "Chunk stored"
        );
        self.emit(TrackerEvent::ChunkReceived {
            operation_id: operation_id.to_string(),
            chunks_received: receipt.chunks_received,
            total_chunks: receipt.total_chunks,
        });

        if receipt.ready {
            let tracker = self.clone();
            let operation_id = operation_id.to_string();
            let total = receipt.total_chunks;
            tokio::spawn(async move {
                tracker.assemble_and_restore(operation_id, dir, total).await;
            });
        }
        Ok(receipt)
    }

    async fn assemble_and_restore(&self, operation_id: String, dir: PathBuf, total: u64) {
        let archive = dir.join(ASSEMBLED_ARCHIVE);
        let target = archive.clone();
        match run_blocking(move || chunks::assemble_chunks(&dir, total, &target)).await {
            Ok(bytes) => {
                info!(operation_id = %operation_id, bytes, total_chunks = total, "Chunks assembled");
                let _ = self
                    .registry
                    .update(&operation_id, |r| {
                        r.file_path = Some(archive.to_string_lossy().into_owned());
                        Ok(())
                    })
                    .await;
                self.run_restore(operation_id, OperationType::RestoreChunked, archive)
                    .await;
            }
            Err(e) => {
                self.finish(&operation_id, OperationType::RestoreChunked, Err(e))
                    .await;
            }
        }
    }

    fn spawn_restore(&self, operation_id: String, operation_type: OperationType, archive: PathBuf) {
        let tracker = self.clone();
        tokio::spawn(async move {
            tracker.run_restore(operation_id, operation_type, archive).await;
        });
    }

    async fn run_restore(
        &self,
        operation_id: String,
        operation_type: OperationType,
        archive: PathBuf,
    ) {
        self.emit(TrackerEvent::Processing {
            operation_id: operation_id.clone(),
            operation_type,
        });
        let _ = self
            .registry
            .update(&operation_id, |r| {
                r.progress_message = Some("Restoring storage tree".to_string());
                Ok(())
            })
            .await;

        let root = self.storage.root().to_path_buf();
        let safety = self.storage.safety_dir().to_path_buf();
        let outcome = {
            let _guard = self.tree_lock.lock().await;
            run_blocking(move || restore_from_archive(&root, &archive, &safety)).await
        };
        let outcome = outcome.and_then(|summary| Ok(serde_json::to_value(summary)?));
        self.finish(&operation_id, operation_type, outcome).await;
    }

    // =========================================================================
    // COMPLETION AND CLEANUP
    // =========================================================================

    async fn finish(
        &self,
        operation_id: &str,
        operation_type: OperationType,
        outcome: Result<JsonValue>,
    ) {
        let (next, error) = match outcome {
            Ok(result) => {
                let stored = self
                    .registry
                    .update(operation_id, |r| {
                        r.result = Some(result);
                        r.progress_message = None;
                        r.transition(OperationStatus::Completed)
                    })
                    .await;
                (stored.map(|()| OperationStatus::Completed), None)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(operation_id, ?operation_type, error = %message, "Operation failed");
                let stored = self
                    .registry
                    .update(operation_id, |r| {
                        r.error = Some(message.clone());
                        r.progress_message = None;
                        r.transition(OperationStatus::Failed)
                    })
                    .await;
                (stored.map(|()| OperationStatus::Failed), Some(message))
            }
        };

        if let Err(e) = next {
            error!(operation_id, error = %e, "Could not record operation outcome");
        }
        let event = match error {
            None => {
                info!(operation_id, ?operation_type, "Operation completed");
                TrackerEvent::Completed {
                    operation_id: operation_id.to_string(),
                    operation_type,
                }
            }
            Some(error) => TrackerEvent::Failed {
                operation_id: operation_id.to_string(),
                operation_type,
                error,
            },
        };
        self.emit(event);
        self.schedule_cleanup(operation_id.to_string());
    }

    /// Delete the operation files after the retention window, then drop the
    /// record after the grace delay. Cancelled by [`shutdown`](Self::shutdown).
    pub(crate) fn schedule_cleanup(&self, operation_id: String) {
        let tracker = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tracker.cancel.cancelled() => return,
                _ = tokio::time::sleep(tracker.config.retention) => {}
            }

            let dir = tracker.registry.operation_dir(&operation_id);
            if let Err(e) = remove_operation_dir(dir).await {
                warn!(operation_id = %operation_id, error = %e, "Failed to delete operation files");
            }
            let _ = tracker
                .registry
                .update(&operation_id, |r| {
                    r.files_expired = true;
                    Ok(())
                })
                .await;
            debug!(operation_id = %operation_id, "Operation files expired");
            tracker.emit(TrackerEvent::FilesExpired {
                operation_id: operation_id.clone(),
            });

            tokio::select! {
                _ = tracker.cancel.cancelled() => return,
                _ = tokio::time::sleep(tracker.config.grace) => {}
            }
            tracker.registry.remove(&operation_id).await;
            debug!(operation_id = %operation_id, "Operation record removed");
            tracker.emit(TrackerEvent::Removed { operation_id });
        });
    }
}

async fn remove_operation_dir(dir: PathBuf) -> Result<()> {
    run_blocking(move || match std::fs::remove_dir_all(&dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    })
    .await
}

fn status_label(status: OperationStatus) -> &'static str {
    match status {
        OperationStatus::InProgress => "in_progress",
        OperationStatus::ReceivingChunks => "receiving_chunks",
        OperationStatus::Processing => "processing",
        OperationStatus::Completed => "completed",
        OperationStatus::Failed => "failed",
    }
}
