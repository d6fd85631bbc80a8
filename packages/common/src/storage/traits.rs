use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

use super::error::StorageError;
use super::file_id::FileId;
use super::metadata::{DeclaredMetadata, FileMetadata, PendingFile};

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Persists fixed-size chunks keyed by `(file id, sequence number)`.
///
/// Chunks are append-only: a chunk is never overwritten, only removed together
/// with the rest of its file.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Write chunk `seq` of a file. Fails with `DuplicateChunk` if it exists.
    async fn put_chunk(&self, file_id: &FileId, seq: u32, payload: Bytes)
    -> Result<(), StorageError>;

    /// Read a single chunk, `None` if it was never written or was deleted.
    async fn get_chunk(&self, file_id: &FileId, seq: u32) -> Result<Option<Bytes>, StorageError>;

    /// Number of chunks currently stored for a file.
    async fn count_chunks(&self, file_id: &FileId) -> Result<u64, StorageError>;

    /// Remove every chunk of a file and return how many were removed.
    async fn delete_chunks(&self, file_id: &FileId) -> Result<u64, StorageError>;
}

/// Maps file ids to their descriptive attributes.
///
/// Records go through two states: pending (created when an upload starts,
/// invisible to `resolve`) and committed.
#[async_trait]
pub trait MetadataIndex: Send + Sync {
    /// Record an upload that has started but not finished.
    async fn create_pending(
        &self,
        file_id: &FileId,
        declared: DeclaredMetadata,
    ) -> Result<PendingFile, StorageError>;

    /// Finalize a pending record with its size, making it resolvable.
    async fn commit(&self, file_id: &FileId, size_bytes: u64)
    -> Result<FileMetadata, StorageError>;

    /// Look up a committed record. Pending records yield `NotFound`.
    async fn resolve(&self, file_id: &FileId) -> Result<FileMetadata, StorageError>;

    /// Delete a record in either state.
    ///
    /// Returns `true` if a record was deleted, `false` if none existed.
    async fn delete(&self, file_id: &FileId) -> Result<bool, StorageError>;

    /// Ids of pending records created before `cutoff`.
    async fn list_pending_before(&self, cutoff: DateTime<Utc>)
    -> Result<Vec<FileId>, StorageError>;
}
