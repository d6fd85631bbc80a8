use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use rand::RngCore;
use tokio::fs;

use super::error::StorageError;
use super::file_id::FileId;
use super::traits::ChunkStore;

const CHUNK_EXTENSION: &str = "chunk";

/// Filesystem-backed chunk store.
///
/// Chunks live in a sharded directory layout:
/// `{base_path}/{first 2 hex chars}/{file id}/{seq:08}.chunk`
pub struct FilesystemChunkStore {
    base_path: PathBuf,
}

impl FilesystemChunkStore {
    /// Create a new filesystem chunk store, creating `base_path` if needed.
    pub async fn new(base_path: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self { base_path })
    }

    fn file_dir(&self, file_id: &FileId) -> PathBuf {
        self.base_path
            .join(file_id.shard_prefix())
            .join(file_id.to_hex())
    }

    fn chunk_path(&self, file_id: &FileId, seq: u32) -> PathBuf {
        self.file_dir(file_id)
            .join(format!("{seq:08}.{CHUNK_EXTENSION}"))
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        let mut suffix = [0u8; 8];
        rand::rng().fill_bytes(&mut suffix);
        self.base_path.join(".tmp").join(hex::encode(suffix))
    }
}

#[async_trait]
impl ChunkStore for FilesystemChunkStore {
    async fn put_chunk(
        &self,
        file_id: &FileId,
        seq: u32,
        payload: Bytes,
    ) -> Result<(), StorageError> {
        let chunk_path = self.chunk_path(file_id, seq);
        if fs::try_exists(&chunk_path).await? {
            return Err(StorageError::DuplicateChunk {
                file_id: *file_id,
                seq,
            });
        }

        let temp_path = self.temp_path();
        if let Err(e) = fs::write(&temp_path, &payload).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        fs::create_dir_all(self.file_dir(file_id)).await?;

        if let Err(e) = fs::rename(&temp_path, &chunk_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn get_chunk(&self, file_id: &FileId, seq: u32) -> Result<Option<Bytes>, StorageError> {
        match fs::read(self.chunk_path(file_id, seq)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn count_chunks(&self, file_id: &FileId) -> Result<u64, StorageError> {
        let mut entries = match fs::read_dir(self.file_dir(file_id)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry
                .path()
                .extension()
                .is_some_and(|ext| ext == CHUNK_EXTENSION)
            {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_chunks(&self, file_id: &FileId) -> Result<u64, StorageError> {
        let count = self.count_chunks(file_id).await?;
        match fs::remove_dir_all(self.file_dir(file_id)).await {
            Ok(()) => Ok(count),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
