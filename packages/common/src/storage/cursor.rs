use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, BoxStream};

use super::error::StorageError;
use super::file_id::FileId;
use super::traits::ChunkStore;

/// Lazy, finite stream of byte buffers.
pub type ByteStream = BoxStream<'static, Result<Bytes, StorageError>>;

/// An open, ordered read over the chunks of one file.
///
/// Each chunk is fetched only when the stream is polled, so at most one chunk
/// is held in memory. Dropping the cursor releases it; re-reading a file means
/// opening a new cursor.
pub struct ChunkCursor {
    total: u64,
    chunks: ByteStream,
}

impl ChunkCursor {
    /// Number of chunks present when the cursor was opened.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn into_stream(self) -> ByteStream {
        self.chunks
    }
}

/// Open the chunks of a file in sequence order, starting at `first_seq`.
///
/// Fails with `NotFound` when no chunk exists for the file. A gap in the
/// sequence surfaces as a `CorruptedFile` item when the stream reaches it.
pub async fn open_chunks(
    store: &Arc<dyn ChunkStore>,
    file_id: &FileId,
    first_seq: u32,
) -> Result<ChunkCursor, StorageError> {
    let total = store.count_chunks(file_id).await?;
    if total == 0 {
        return Err(StorageError::NotFound(*file_id));
    }

    let store = Arc::clone(store);
    let file_id = *file_id;
    let chunks = stream::try_unfold(first_seq, move |seq| {
        let store = Arc::clone(&store);
        async move {
            if u64::from(seq) >= total {
                return Ok(None);
            }
            match store.get_chunk(&file_id, seq).await? {
                Some(payload) => Ok(Some((payload, seq + 1))),
                None => Err(StorageError::corrupted(
                    file_id,
                    format!("chunk {seq} of {total} is missing"),
                )),
            }
        }
    });

    Ok(ChunkCursor {
        total,
        chunks: Box::pin(chunks),
    })
}
