//! Relational backends of the blob store, on top of the `blob_file` and
//! `blob_chunk` tables.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::config::{ChunkBackend, StorageConfig};
use common::storage::filesystem::FilesystemChunkStore;
use common::storage::{
    BlobStore, ChunkStore, DeclaredMetadata, FileId, FileMetadata, MetadataIndex, PendingFile,
    StorageError,
};
use sea_orm::sea_query::Expr;
use sea_orm::*;

use crate::entity::{blob_chunk, blob_file};

fn backend(err: DbErr) -> StorageError {
    StorageError::Backend(err.to_string())
}

/// Chunk store keeping payloads in the `blob_chunk` table.
pub struct DbChunkStore {
    db: DatabaseConnection,
}

impl DbChunkStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChunkStore for DbChunkStore {
    async fn put_chunk(
        &self,
        file_id: &FileId,
        seq: u32,
        payload: Bytes,
    ) -> Result<(), StorageError> {
        let seq_col = i32::try_from(seq)
            .map_err(|_| StorageError::Backend(format!("chunk index {seq} out of range")))?;

        let model = blob_chunk::ActiveModel {
            file_id: Set(file_id.to_hex()),
            seq: Set(seq_col),
            payload: Set(payload.to_vec()),
        };

        blob_chunk::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => StorageError::DuplicateChunk {
                    file_id: *file_id,
                    seq,
                },
                _ => backend(e),
            })?;
        Ok(())
    }

    async fn get_chunk(&self, file_id: &FileId, seq: u32) -> Result<Option<Bytes>, StorageError> {
        let Ok(seq) = i32::try_from(seq) else {
            return Ok(None);
        };
        let chunk = blob_chunk::Entity::find_by_id((file_id.to_hex(), seq))
            .one(&self.db)
            .await
            .map_err(backend)?;
        Ok(chunk.map(|c| Bytes::from(c.payload)))
    }

    async fn count_chunks(&self, file_id: &FileId) -> Result<u64, StorageError> {
        blob_chunk::Entity::find()
            .filter(blob_chunk::Column::FileId.eq(file_id.to_hex()))
            .count(&self.db)
            .await
            .map_err(backend)
    }

    async fn delete_chunks(&self, file_id: &FileId) -> Result<u64, StorageError> {
        let result = blob_chunk::Entity::delete_many()
            .filter(blob_chunk::Column::FileId.eq(file_id.to_hex()))
            .exec(&self.db)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected)
    }
}

/// Metadata index over the `blob_file` table.
pub struct DbMetadataIndex {
    db: DatabaseConnection,
}

impl DbMetadataIndex {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_metadata(model: blob_file::Model) -> Result<FileMetadata, StorageError> {
    let file_id = FileId::from_hex(&model.file_id)?;
    let custom_metadata: BTreeMap<String, String> = serde_json::from_str(&model.custom_metadata)
        .map_err(|e| StorageError::Backend(format!("bad custom metadata for {file_id}: {e}")))?;
    let size_bytes = u64::try_from(model.size_bytes).map_err(|_| {
        StorageError::CorruptedFile {
            file_id,
            detail: format!("negative size {}", model.size_bytes),
        }
    })?;
    let chunk_size = u32::try_from(model.chunk_size)
        .ok()
        .filter(|&size| size > 0)
        .ok_or_else(|| StorageError::CorruptedFile {
            file_id,
            detail: format!("invalid chunk size {}", model.chunk_size),
        })?;
    Ok(FileMetadata {
        file_id,
        stored_name: model.stored_name,
        original_name: model.original_name,
        content_type: model.content_type,
        size_bytes,
        chunk_size,
        uploaded_at: model.uploaded_at,
        custom_metadata,
    })
}

#[async_trait]
impl MetadataIndex for DbMetadataIndex {
    async fn create_pending(
        &self,
        file_id: &FileId,
        declared: DeclaredMetadata,
    ) -> Result<PendingFile, StorageError> {
        let custom_metadata = serde_json::to_string(&declared.custom_metadata)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let chunk_size = i32::try_from(declared.chunk_size)
            .map_err(|_| StorageError::Backend("chunk size out of range".into()))?;

        let model = blob_file::ActiveModel {
            file_id: Set(file_id.to_hex()),
            stored_name: Set(declared.stored_name.clone()),
            original_name: Set(declared.original_name.clone()),
            content_type: Set(declared.content_type.clone()),
            size_bytes: Set(0),
            chunk_size: Set(chunk_size),
            committed: Set(false),
            custom_metadata: Set(custom_metadata),
            uploaded_at: Set(declared.uploaded_at),
        };
        blob_file::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await
            .map_err(backend)?;

        Ok(PendingFile {
            file_id: *file_id,
            declared,
        })
    }

    async fn commit(
        &self,
        file_id: &FileId,
        size_bytes: u64,
    ) -> Result<FileMetadata, StorageError> {
        let size = i64::try_from(size_bytes)
            .map_err(|_| StorageError::Backend("file size out of range".into()))?;

        // Only a pending row may be committed, so a concurrent delete or a
        // second commit leaves zero rows affected.
        let result = blob_file::Entity::update_many()
            .col_expr(blob_file::Column::Committed, Expr::value(true))
            .col_expr(blob_file::Column::SizeBytes, Expr::value(size))
            .filter(blob_file::Column::FileId.eq(file_id.to_hex()))
            .filter(blob_file::Column::Committed.eq(false))
            .exec(&self.db)
            .await
            .map_err(backend)?;
        if result.rows_affected == 0 {
            return Err(StorageError::NotPending(*file_id));
        }

        self.resolve(file_id).await
    }

    async fn resolve(&self, file_id: &FileId) -> Result<FileMetadata, StorageError> {
        let model = blob_file::Entity::find_by_id(file_id.to_hex())
            .filter(blob_file::Column::Committed.eq(true))
            .one(&self.db)
            .await
            .map_err(backend)?
            .ok_or(StorageError::NotFound(*file_id))?;
        to_metadata(model)
    }

    async fn delete(&self, file_id: &FileId) -> Result<bool, StorageError> {
        let result = blob_file::Entity::delete_by_id(file_id.to_hex())
            .exec(&self.db)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected > 0)
    }

    async fn list_pending_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<FileId>, StorageError> {
        let rows = blob_file::Entity::find()
            .filter(blob_file::Column::Committed.eq(false))
            .filter(blob_file::Column::UploadedAt.lt(cutoff))
            .all(&self.db)
            .await
            .map_err(backend)?;

        rows.iter()
            .map(|row| FileId::from_hex(&row.file_id))
            .collect()
    }
}

/// Build the blob store selected by `config.chunk_backend`. The metadata index
/// always lives in the database.
pub async fn build_blob_store(
    db: &DatabaseConnection,
    config: StorageConfig,
) -> Result<BlobStore, StorageError> {
    let chunks: Arc<dyn ChunkStore> = match config.chunk_backend {
        ChunkBackend::Database => Arc::new(DbChunkStore::new(db.clone())),
        ChunkBackend::Filesystem => {
            Arc::new(FilesystemChunkStore::new(config.chunk_dir.clone()).await?)
        }
    };
    let index = Arc::new(DbMetadataIndex::new(db.clone()));
    Ok(BlobStore::new(chunks, index, config))
}

/// Periodically remove uploads that stayed pending longer than the configured
/// TTL. The first pass runs immediately.
pub fn spawn_reaper(blobs: BlobStore) -> tokio::task::JoinHandle<()> {
    let interval = std::time::Duration::from_secs(std::cmp::Ord::max(blobs.config().reap_interval_secs, 1));
    let max_age = chrono::Duration::seconds(
        i64::try_from(blobs.config().pending_ttl_secs).unwrap_or(i64::MAX),
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = blobs.reap_stale_uploads(max_age).await {
                tracing::warn!(error = %e, "Stale upload sweep failed");
            }
        }
    })
}
