use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::storage::FileMetadata;
use serde::Serialize;

/// Descriptive attributes of a stored file.
#[derive(Serialize, utoipa::ToSchema)]
pub struct FileInfoResponse {
    #[schema(example = "9f86d081884c7d659a2feaa0c55ad015")]
    pub file_id: String,
    #[schema(example = "9f86d081884c7d659a2feaa0c55ad015.pdf")]
    pub stored_name: String,
    #[schema(example = "unit3.pdf")]
    pub original_name: String,
    #[schema(example = "application/pdf")]
    pub content_type: String,
    #[schema(example = 614400)]
    pub size_bytes: u64,
    #[schema(example = 261120)]
    pub chunk_size: u32,
    pub uploaded_at: DateTime<Utc>,
    pub custom_metadata: BTreeMap<String, String>,
}

impl From<FileMetadata> for FileInfoResponse {
    fn from(meta: FileMetadata) -> Self {
        Self {
            file_id: meta.file_id.to_hex(),
            stored_name: meta.stored_name,
            original_name: meta.original_name,
            content_type: meta.content_type,
            size_bytes: meta.size_bytes,
            chunk_size: meta.chunk_size,
            uploaded_at: meta.uploaded_at,
            custom_metadata: meta.custom_metadata,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct FileDeleteResponse {
    /// `false` when the file was already gone.
    pub deleted: bool,
}
