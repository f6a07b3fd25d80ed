//! Chunked restore uploads.
//!
//! Each chunk is streamed to a staging file and renamed to
//! `{operation_dir}/{index}.part` only once fully received. The registry counts
//! distinct chunk indices; the call that brings the count to the declared
//! total moves the operation to `processing`, which happens exactly once.
//! Assembly then concatenates the parts in index order.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use depot_core::{Error, OperationStatus, OperationType, Result};

use crate::registry::OperationRegistry;

/// Name of the assembled archive inside the operation directory.
pub const ASSEMBLED_ARCHIVE: &str = "restore.zip";

/// Progress of a chunked upload after one chunk was stored.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkReceipt {
    pub operation_id: String,
    pub chunks_received: u64,
    pub total_chunks: u64,
    pub status: OperationStatus,
    /// True for the one receipt that completed the upload.
    #[serde(skip)]
    pub ready: bool,
}

pub fn chunk_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("{}.part", index))
}

/// Unique staging file for an in-flight chunk body.
pub fn staged_chunk_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("{}.{}.part.tmp", index, uuid::Uuid::new_v4().simple()))
}

/// Check that `operation_id` is a chunked restore still accepting `index`.
/// Returns the declared chunk count.
pub async fn check_chunk(registry: &OperationRegistry, operation_id: &str, index: u64) -> Result<u64> {
    let record = registry.require(operation_id).await?;
    if record.operation_type != OperationType::RestoreChunked {
        return Err(Error::InvalidInput(format!(
            "Operation {} is not a chunked restore",
            operation_id
        )));
    }
    if record.status != OperationStatus::ReceivingChunks {
        return Err(Error::InvalidInput(format!(
            "Operation {} is not receiving chunks",
            operation_id
        )));
    }
    let total = record
        .total_chunks
        .ok_or_else(|| Error::Internal(format!("operation {} has no chunk count", operation_id)))?;
    if index >= total {
        return Err(Error::InvalidInput(format!(
            "Chunk number {} out of range (total {})",
            index, total
        )));
    }
    Ok(total)
}

/// Account for a stored chunk. `new_index` is false when the index had been
/// received before (a retransmission overwrites the part without counting).
pub async fn record_chunk(
    registry: &OperationRegistry,
    operation_id: &str,
    new_index: bool,
) -> Result<ChunkReceipt> {
    registry
        .update(operation_id, |record| {
            if record.status != OperationStatus::ReceivingChunks {
                return Err(Error::InvalidInput(format!(
                    "Operation {} is not receiving chunks",
                    operation_id
                )));
            }
            if new_index {
                record.chunks_received += 1;
            }
            let total_chunks = record.total_chunks.unwrap_or(0);
            let ready = record.all_chunks_received();
            if ready {
                record.transition(OperationStatus::Processing)?;
                record.progress_message = Some("Assembling chunks".to_string());
            } else {
                record.progress_message = Some(format!(
                    "Received {} of {} chunks",
                    record.chunks_received, total_chunks
                ));
            }
            Ok(ChunkReceipt {
                operation_id: operation_id.to_string(),
                chunks_received: record.chunks_received,
                total_chunks,
                status: record.status,
                ready,
            })
        })
        .await
}

/// Concatenate `0.part .. {total-1}.part` into `target`, removing the parts.
/// Returns the number of bytes written.
pub fn assemble_chunks(dir: &Path, total: u64, target: &Path) -> Result<u64> {
    let mut out = BufWriter::new(File::create(target)?);
    let mut bytes = 0u64;
    for index in 0..total {
        let part = chunk_path(dir, index);
        let mut source = File::open(&part).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::InvalidInput(format!("Missing chunk {}", index)),
            _ => Error::Io(e),
        })?;
        bytes += io::copy(&mut source, &mut out)?;
    }
    out.flush()?;
    for index in 0..total {
        let _ = fs::remove_file(chunk_path(dir, index));
    }
    Ok(bytes)
}
