mod blob;
mod cursor;
mod error;
mod file_id;
mod metadata;
mod range;
mod traits;

pub mod filesystem;
pub mod memory;

pub use blob::{BlobDownload, BlobStore, UploadRequest};
pub use cursor::{ByteStream, ChunkCursor, open_chunks};
pub use error::StorageError;
pub use file_id::FileId;
pub use metadata::{DEFAULT_CONTENT_TYPE, DeclaredMetadata, FileMetadata, PendingFile};
pub use range::{ByteRange, RangeRequest};
pub use traits::{BoxReader, ChunkStore, MetadataIndex};
