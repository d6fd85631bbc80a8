use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::error::StorageError;
use super::file_id::FileId;
use super::metadata::{DeclaredMetadata, FileMetadata, PendingFile};
use super::traits::{ChunkStore, MetadataIndex};

/// In-process chunk store. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryChunkStore {
    files: DashMap<FileId, BTreeMap<u32, Bytes>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no file has any chunk stored.
    pub fn is_empty(&self) -> bool {
        self.files.iter().all(|entry| entry.value().is_empty())
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn put_chunk(
        &self,
        file_id: &FileId,
        seq: u32,
        payload: Bytes,
    ) -> Result<(), StorageError> {
        let mut chunks = self.files.entry(*file_id).or_default();
        if chunks.contains_key(&seq) {
            return Err(StorageError::DuplicateChunk {
                file_id: *file_id,
                seq,
            });
        }
        chunks.insert(seq, payload);
        Ok(())
    }

    async fn get_chunk(&self, file_id: &FileId, seq: u32) -> Result<Option<Bytes>, StorageError> {
        Ok(self
            .files
            .get(file_id)
            .and_then(|chunks| chunks.get(&seq).cloned()))
    }

    async fn count_chunks(&self, file_id: &FileId) -> Result<u64, StorageError> {
        Ok(self
            .files
            .get(file_id)
            .map_or(0, |chunks| chunks.len() as u64))
    }

    async fn delete_chunks(&self, file_id: &FileId) -> Result<u64, StorageError> {
        Ok(self
            .files
            .remove(file_id)
            .map_or(0, |(_, chunks)| chunks.len() as u64))
    }
}

#[derive(Clone)]
struct IndexEntry {
    declared: DeclaredMetadata,
    committed: Option<u64>,
}

/// In-process metadata index.
#[derive(Default)]
pub struct MemoryMetadataIndex {
    entries: DashMap<FileId, IndexEntry>,
}

impl MemoryMetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in either state.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl MetadataIndex for MemoryMetadataIndex {
    async fn create_pending(
        &self,
        file_id: &FileId,
        declared: DeclaredMetadata,
    ) -> Result<PendingFile, StorageError> {
        match self.entries.entry(*file_id) {
            Entry::Occupied(_) => Err(StorageError::Backend(format!(
                "metadata for {file_id} already exists"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(IndexEntry {
                    declared: declared.clone(),
                    committed: None,
                });
                Ok(PendingFile {
                    file_id: *file_id,
                    declared,
                })
            }
        }
    }

    async fn commit(
        &self,
        file_id: &FileId,
        size_bytes: u64,
    ) -> Result<FileMetadata, StorageError> {
        let mut entry = self
            .entries
            .get_mut(file_id)
            .ok_or(StorageError::NotPending(*file_id))?;
        if entry.committed.is_some() {
            return Err(StorageError::NotPending(*file_id));
        }
        entry.committed = Some(size_bytes);
        Ok(FileMetadata::from_declared(
            *file_id,
            entry.declared.clone(),
            size_bytes,
        ))
    }

    async fn resolve(&self, file_id: &FileId) -> Result<FileMetadata, StorageError> {
        let entry = self
            .entries
            .get(file_id)
            .ok_or(StorageError::NotFound(*file_id))?;
        match entry.committed {
            Some(size_bytes) => Ok(FileMetadata::from_declared(
                *file_id,
                entry.declared.clone(),
                size_bytes,
            )),
            None => Err(StorageError::NotFound(*file_id)),
        }
    }

    async fn delete(&self, file_id: &FileId) -> Result<bool, StorageError> {
        Ok(self.entries.remove(file_id).is_some())
    }

    async fn list_pending_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<FileId>, StorageError> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.committed.is_none() && entry.declared.uploaded_at < cutoff)
            .map(|entry| *entry.key())
            .collect())
    }
}
