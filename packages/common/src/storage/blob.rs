use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{Duration, Utc};
use futures::TryStreamExt;
use futures::stream;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, warn};

use super::cursor::{ByteStream, ChunkCursor, open_chunks};
use super::error::StorageError;
use super::file_id::FileId;
use super::metadata::{DEFAULT_CONTENT_TYPE, DeclaredMetadata, FileMetadata};
use super::range::ByteRange;
use super::traits::{BoxReader, ChunkStore, MetadataIndex};
use crate::config::StorageConfig;

/// Caller-declared attributes of an upload.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub original_name: String,
    pub content_type: Option<String>,
    pub custom_metadata: BTreeMap<String, String>,
}

/// A resolved file plus the stream of its (possibly ranged) content.
pub struct BlobDownload {
    pub metadata: FileMetadata,
    /// `None` when the whole file is streamed.
    pub range: Option<ByteRange>,
    pub body: ByteStream,
}

impl BlobDownload {
    /// Number of bytes `body` will yield.
    pub fn content_length(&self) -> u64 {
        self.range
            .map_or(self.metadata.size_bytes, |range| range.len())
    }
}

/// Chunked blob store: a `ChunkStore` and a `MetadataIndex` composed into the
/// upload, download and delete pipelines.
///
/// Cloning is cheap; every clone shares the same backends.
#[derive(Clone)]
pub struct BlobStore {
    chunks: Arc<dyn ChunkStore>,
    index: Arc<dyn MetadataIndex>,
    config: Arc<StorageConfig>,
}

impl BlobStore {
    pub fn new(
        chunks: Arc<dyn ChunkStore>,
        index: Arc<dyn MetadataIndex>,
        config: StorageConfig,
    ) -> Self {
        Self {
            chunks,
            index,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Store an upload and return its committed metadata.
    ///
    /// The file type is checked before anything is written. On any later
    /// failure, including the returned future being dropped, the chunks and
    /// the pending record are removed again.
    pub async fn upload(
        &self,
        request: UploadRequest,
        mut reader: BoxReader,
    ) -> Result<FileMetadata, StorageError> {
        let extension = self
            .config
            .check_file_type(&request.original_name, request.content_type.as_deref())?;

        let file_id = FileId::generate();
        let uploaded_at = Utc::now();
        let content_type = request
            .content_type
            .filter(|ct| !ct.trim().is_empty() && ct.trim() != "application/octet-stream")
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let mut custom_metadata = request.custom_metadata;
        custom_metadata.insert("originalName".into(), request.original_name.clone());
        custom_metadata.insert("uploadedAt".into(), uploaded_at.to_rfc3339());
        custom_metadata.insert("contentType".into(), content_type.clone());

        let declared = DeclaredMetadata {
            stored_name: format!("{file_id}.{extension}"),
            original_name: request.original_name,
            content_type,
            chunk_size: self.config.chunk_size_bytes,
            uploaded_at,
            custom_metadata,
        };

        let mut guard = RollbackGuard::new(self.clone(), file_id);

        let result = async {
            self.index.create_pending(&file_id, declared).await?;
            let size_bytes = self.write_chunks(&file_id, &mut reader).await?;
            self.index.commit(&file_id, size_bytes).await
        }
        .await;

        match result {
            Ok(metadata) => {
                guard.disarm();
                debug!(%file_id, size = metadata.size_bytes, "Upload committed");
                Ok(metadata)
            }
            Err(err) => {
                guard.disarm();
                warn!(%file_id, error = %err, "Upload failed, rolling back");
                self.rollback(&file_id).await;
                Err(err)
            }
        }
    }

    /// Read `reader` in chunk-sized windows and write each as the next chunk.
    async fn write_chunks(
        &self,
        file_id: &FileId,
        reader: &mut BoxReader,
    ) -> Result<u64, StorageError> {
        let chunk_size = self.config.chunk_size_bytes as usize;
        let limit = self.config.max_size_bytes;
        let mut seq: u32 = 0;
        let mut total: u64 = 0;

        loop {
            let window = read_window(reader, chunk_size)
                .await
                .map_err(StorageError::Source)?;
            if window.is_empty() {
                break;
            }

            total += window.len() as u64;
            if total > limit {
                return Err(StorageError::SizeExceeded { limit });
            }

            let short = window.len() < chunk_size;
            self.chunks.put_chunk(file_id, seq, window).await?;
            seq += 1;

            if short {
                break;
            }
        }

        Ok(total)
    }

    /// Best-effort removal of everything written for `file_id`.
    async fn rollback(&self, file_id: &FileId) {
        if let Err(e) = self.chunks.delete_chunks(file_id).await {
            warn!(%file_id, error = %e, "Rollback failed to delete chunks");
        }
        if let Err(e) = self.index.delete(file_id).await {
            warn!(%file_id, error = %e, "Rollback failed to delete pending metadata");
        }
    }

    /// Committed metadata for a file.
    pub async fn file_info(&self, file_id: &FileId) -> Result<FileMetadata, StorageError> {
        self.index.resolve(file_id).await
    }

    /// Resolve a file and stream its content, or `range` of it.
    pub async fn open_download(
        &self,
        file_id: &FileId,
        range: Option<ByteRange>,
    ) -> Result<BlobDownload, StorageError> {
        let metadata = self.index.resolve(file_id).await?;
        let body = self.stream(&metadata, range).await?;
        Ok(BlobDownload {
            metadata,
            range,
            body,
        })
    }

    /// Stream the content of a resolved file, optionally restricted to a range.
    ///
    /// The chunk count is checked against the metadata before the stream is
    /// returned, so a caller can still send an error response. Problems found
    /// later (a chunk deleted mid-stream, a chunk of the wrong length) end the
    /// stream with `CorruptedFile`.
    pub async fn stream(
        &self,
        metadata: &FileMetadata,
        range: Option<ByteRange>,
    ) -> Result<ByteStream, StorageError> {
        let file_id = metadata.file_id;
        let size = metadata.size_bytes;

        if let Some(range) = range
            && (range.start > range.end || range.end >= size)
        {
            return Err(StorageError::RangeNotSatisfiable { size });
        }

        if size == 0 {
            return Ok(Box::pin(stream::empty()));
        }

        let range = range.or_else(|| ByteRange::full(size)).ok_or_else(|| {
            StorageError::corrupted(file_id, "file has no bytes to stream")
        })?;

        let chunk_size = u64::from(metadata.chunk_size);
        let first_seq = range.start / chunk_size;
        let first_seq_u32 = u32::try_from(first_seq)
            .map_err(|_| StorageError::corrupted(file_id, "chunk index out of range"))?;

        let cursor = match open_chunks(&self.chunks, &file_id, first_seq_u32).await {
            Ok(cursor) => cursor,
            Err(StorageError::NotFound(_)) => {
                error!(
                    %file_id,
                    expected = metadata.expected_chunks(),
                    "Metadata exists but no chunks were found"
                );
                return Err(StorageError::corrupted(file_id, "no chunks stored"));
            }
            Err(e) => return Err(e),
        };

        let expected = metadata.expected_chunks();
        if cursor.total() != expected {
            error!(
                %file_id,
                found = cursor.total(),
                expected,
                "Chunk count does not match file size"
            );
            return Err(StorageError::corrupted(
                file_id,
                format!("found {} chunks, expected {expected}", cursor.total()),
            ));
        }

        Ok(reassemble(
            cursor,
            metadata.clone(),
            first_seq,
            (range.start - first_seq * chunk_size) as usize,
            range.len(),
        ))
    }

    /// Remove a file's metadata and chunks.
    ///
    /// Returns `true` if anything was removed and `false` if the file was
    /// already gone. Metadata goes first so a half-finished delete never leaves
    /// a resolvable record without chunks. If the metadata delete fails the
    /// chunks are left alone and the file stays downloadable; a chunk failure
    /// after that is only logged, since the record is already unresolvable and
    /// a retry removes the leftovers.
    pub async fn delete(&self, file_id: &FileId) -> Result<bool, StorageError> {
        let had_metadata = self.index.delete(file_id).await.inspect_err(|e| {
            warn!(%file_id, error = %e, "Failed to delete file metadata");
        })?;

        let removed_chunks = match self.chunks.delete_chunks(file_id).await {
            Ok(n) => n,
            Err(e) => {
                warn!(%file_id, error = %e, "Failed to delete file chunks");
                if !had_metadata {
                    return Err(e);
                }
                0
            }
        };
        debug!(%file_id, had_metadata, removed_chunks, "File deleted");
        Ok(had_metadata || removed_chunks > 0)
    }

    /// Clean up uploads left pending for longer than `max_age`, e.g. by a
    /// crash between writing chunks and committing.
    ///
    /// Returns the number of uploads removed.
    pub async fn reap_stale_uploads(&self, max_age: Duration) -> Result<usize, StorageError> {
        let cutoff = Utc::now() - max_age;
        let stale = self.index.list_pending_before(cutoff).await?;
        for file_id in &stale {
            self.rollback(file_id).await;
        }
        if !stale.is_empty() {
            info!("Reaped {} stale pending uploads", stale.len());
        }
        Ok(stale.len())
    }
}

/// Fill a buffer of `size` bytes from `reader`, stopping early only at EOF.
async fn read_window(reader: &mut BoxReader, size: usize) -> std::io::Result<Bytes> {
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(Bytes::from(buf))
}

struct Reassembly {
    chunks: ByteStream,
    metadata: FileMetadata,
    seq: u64,
    skip: usize,
    remaining: u64,
}

/// Check each chunk's length against the metadata and trim the stream to
/// `remaining` bytes starting `skip` bytes into chunk `first_seq`.
fn reassemble(
    cursor: ChunkCursor,
    metadata: FileMetadata,
    first_seq: u64,
    skip: usize,
    remaining: u64,
) -> ByteStream {
    let state = Reassembly {
        chunks: cursor.into_stream(),
        metadata,
        seq: first_seq,
        skip,
        remaining,
    };

    Box::pin(stream::try_unfold(state, |mut state| async move {
        if state.remaining == 0 {
            return Ok(None);
        }

        let file_id = state.metadata.file_id;
        let Some(chunk) = state.chunks.try_next().await? else {
            error!(%file_id, seq = state.seq, "Chunk stream ended early");
            return Err(StorageError::corrupted(
                file_id,
                format!("chunk stream ended before chunk {}", state.seq),
            ));
        };

        let expected = state.metadata.chunk_len(state.seq);
        if chunk.len() as u64 != expected {
            error!(
                %file_id,
                seq = state.seq,
                len = chunk.len(),
                expected,
                "Chunk has unexpected length"
            );
            return Err(StorageError::corrupted(
                file_id,
                format!(
                    "chunk {} has {} bytes, expected {expected}",
                    state.seq,
                    chunk.len()
                ),
            ));
        }

        let mut piece = chunk;
        if state.skip > 0 {
            piece = piece.slice(state.skip..);
            state.skip = 0;
        }
        if piece.len() as u64 > state.remaining {
            piece.truncate(state.remaining as usize);
        }
        state.remaining -= piece.len() as u64;
        state.seq += 1;

        Ok(Some((piece, state)))
    }))
}

/// Rolls an upload back if its future is dropped before finishing.
struct RollbackGuard {
    store: Option<BlobStore>,
    file_id: FileId,
}

impl RollbackGuard {
    fn new(store: BlobStore, file_id: FileId) -> Self {
        Self {
            store: Some(store),
            file_id,
        }
    }

    fn disarm(&mut self) {
        self.store = None;
    }
}

impl Drop for RollbackGuard {
    fn drop(&mut self) {
        let Some(store) = self.store.take() else {
            return;
        };
        let file_id = self.file_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(%file_id, "Upload cancelled, rolling back");
                handle.spawn(async move { store.rollback(&file_id).await });
            }
            Err(_) => {
                warn!(%file_id, "Upload cancelled outside a runtime; left for the reaper");
            }
        }
    }
}
