use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::storage::StorageError;

/// Upper bound on a single chunk payload.
pub const MAX_CHUNK_SIZE: u32 = 256 * 1024;

/// Where chunk payloads are persisted.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkBackend {
    /// Chunks live in the relational database next to the metadata index.
    #[default]
    Database,
    /// Chunks live under `chunk_dir` on the local filesystem.
    Filesystem,
}

/// Blob store configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Cap on the total bytes of one upload. Default: 10 MiB.
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
    /// Accepted file extensions, lowercase and without the dot. Default: ["pdf"].
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Accepted declared MIME types. Default: ["application/pdf"].
    #[serde(default = "default_allowed_content_types")]
    pub allowed_content_types: Vec<String>,
    /// Size of each stored chunk. Default: 255 KiB.
    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: u32,
    #[serde(default)]
    pub chunk_backend: ChunkBackend,
    /// Root directory for the filesystem chunk backend. Default: "./data/chunks".
    #[serde(default = "default_chunk_dir")]
    pub chunk_dir: PathBuf,
    /// Pending uploads older than this are reaped. Default: 3600.
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,
    /// How often the reaper runs. Default: 600.
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

fn default_max_size_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_allowed_extensions() -> Vec<String> {
    vec!["pdf".into()]
}
fn default_allowed_content_types() -> Vec<String> {
    vec!["application/pdf".into()]
}
fn default_chunk_size_bytes() -> u32 {
    255 * 1024
}
fn default_chunk_dir() -> PathBuf {
    PathBuf::from("./data/chunks")
}
fn default_pending_ttl_secs() -> u64 {
    3600
}
fn default_reap_interval_secs() -> u64 {
    600
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_size_bytes(),
            allowed_extensions: default_allowed_extensions(),
            allowed_content_types: default_allowed_content_types(),
            chunk_size_bytes: default_chunk_size_bytes(),
            chunk_backend: ChunkBackend::default(),
            chunk_dir: default_chunk_dir(),
            pending_ttl_secs: default_pending_ttl_secs(),
            reap_interval_secs: default_reap_interval_secs(),
        }
    }
}

impl StorageConfig {
    /// Reject configurations the upload pipeline cannot honour.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size_bytes == 0 {
            return Err("storage.chunk_size_bytes must be greater than 0".into());
        }
        if self.chunk_size_bytes > MAX_CHUNK_SIZE {
            return Err(format!(
                "storage.chunk_size_bytes must be at most {MAX_CHUNK_SIZE}"
            ));
        }
        if self.max_size_bytes == 0 {
            return Err("storage.max_size_bytes must be greater than 0".into());
        }
        if self.allowed_extensions.is_empty() {
            return Err("storage.allowed_extensions must not be empty".into());
        }
        Ok(())
    }

    /// Check an upload's name and declared type against the allow-lists.
    ///
    /// Returns the lowercased extension on success. A missing content type or
    /// the generic `application/octet-stream` defers to the extension check.
    pub fn check_file_type(
        &self,
        original_name: &str,
        content_type: Option<&str>,
    ) -> Result<String, StorageError> {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .ok_or_else(|| {
                StorageError::InvalidFileType(format!("'{original_name}' has no extension"))
            })?;

        if !self
            .allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
        {
            return Err(StorageError::InvalidFileType(format!(
                "extension '.{extension}' is not allowed"
            )));
        }

        if let Some(content_type) = content_type {
            let essence = content_type
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            let accepted = essence.is_empty()
                || essence == "application/octet-stream"
                || self
                    .allowed_content_types
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(&essence));
            if !accepted {
                return Err(StorageError::InvalidFileType(format!(
                    "content type '{essence}' is not allowed"
                )));
            }
        }

        Ok(extension)
    }
}
