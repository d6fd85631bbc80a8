use super::file_id::FileId;

/// Errors that can occur during blob storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The file extension or declared content type is not on the allow-list.
    /// Raised before anything is written.
    #[error("file type not allowed: {0}")]
    InvalidFileType(String),

    /// The upload stream grew past the configured cap. Partial data has been
    /// rolled back by the time the caller sees this.
    #[error("file exceeds size limit of {limit} bytes")]
    SizeExceeded { limit: u64 },

    /// No committed metadata record exists for the id.
    #[error("file not found: {0}")]
    NotFound(FileId),

    /// Metadata exists but the chunk set does not reproduce it.
    #[error("file {file_id} is corrupted: {detail}")]
    CorruptedFile { file_id: FileId, detail: String },

    /// `commit` was called for an id with no pending upload.
    #[error("no pending upload for file {0}")]
    NotPending(FileId),

    /// A chunk with this sequence number was already written.
    #[error("chunk {seq} of file {file_id} already exists")]
    DuplicateChunk { file_id: FileId, seq: u32 },

    /// The textual file id could not be parsed.
    #[error("invalid file id: {0}")]
    InvalidId(String),

    /// The requested byte range lies outside the file.
    #[error("range not satisfiable for file of {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    /// Reading the caller-supplied upload stream failed (client abort, bad
    /// multipart framing). Treated like a cancelled upload.
    #[error("upload stream failed: {0}")]
    Source(#[source] std::io::Error),

    /// The storage backend reported an error.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// An I/O error occurred in a filesystem backend.
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether this error originates from the storage layer itself rather
    /// than from the request or the stored data.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Io(_) | Self::DuplicateChunk { .. })
    }

    pub(crate) fn corrupted(file_id: FileId, detail: impl Into<String>) -> Self {
        Self::CorruptedFile {
            file_id,
            detail: detail.into(),
        }
    }
}
