use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::file_id::FileId;

/// Content type recorded when the uploader declares none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/pdf";

/// Attributes fixed when an upload starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredMetadata {
    /// Generated name (`<file id>.<ext>`), never taken from the caller.
    pub stored_name: String,
    /// Caller-supplied display name. Not trusted for paths.
    pub original_name: String,
    pub content_type: String,
    /// Chunk size the payload is split with.
    pub chunk_size: u32,
    pub uploaded_at: DateTime<Utc>,
    pub custom_metadata: BTreeMap<String, String>,
}

/// A committed, resolvable file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_id: FileId,
    pub stored_name: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub chunk_size: u32,
    pub uploaded_at: DateTime<Utc>,
    pub custom_metadata: BTreeMap<String, String>,
}

impl FileMetadata {
    pub fn from_declared(file_id: FileId, declared: DeclaredMetadata, size_bytes: u64) -> Self {
        Self {
            file_id,
            stored_name: declared.stored_name,
            original_name: declared.original_name,
            content_type: declared.content_type,
            size_bytes,
            chunk_size: declared.chunk_size,
            uploaded_at: declared.uploaded_at,
            custom_metadata: declared.custom_metadata,
        }
    }

    /// Number of chunks a committed file of this size must have.
    pub fn expected_chunks(&self) -> u64 {
        self.size_bytes.div_ceil(u64::from(self.chunk_size))
    }

    /// Exact payload length of chunk `seq`.
    pub fn chunk_len(&self, seq: u64) -> u64 {
        let chunk_size = u64::from(self.chunk_size);
        let start = seq * chunk_size;
        self.size_bytes.saturating_sub(start).min(chunk_size)
    }
}

/// Handle returned by `MetadataIndex::create_pending`.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub file_id: FileId,
    pub declared: DeclaredMetadata,
}
