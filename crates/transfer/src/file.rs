use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use skylift_protocol::types::FileInfo;

use crate::{ChunkReader, Fingerprint, TransferError};

/// A file queued for upload. Immutable once a session starts.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    /// Caller-assigned identifier (defaults to the file name).
    pub id: String,
    /// Display name sent to the negotiation endpoint.
    pub name: String,
    /// Byte length at the time the descriptor was built.
    pub size: u64,
    pub content_type: String,
    /// Last modification time, milliseconds since the Unix epoch.
    pub last_modified: i64,
    /// Byte source.
    pub path: PathBuf,
}

impl FileDescriptor {
    /// Builds a descriptor by statting `path`.
    ///
    /// The content type defaults to `application/octet-stream`; callers
    /// who know better set it via [`with_content_type`](Self::with_content_type).
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, TransferError> {
        let path = path.into();
        let meta = std::fs::metadata(&path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let last_modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Ok(Self {
            id: name.clone(),
            name,
            size: meta.len(),
            content_type: "application/octet-stream".into(),
            last_modified,
            path,
        })
    }

    /// Returns the descriptor with the given content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Serializable metadata for this file.
    pub fn info(&self) -> FileInfo {
        FileInfo {
            name: self.name.clone(),
            size: self.size,
            content_type: self.content_type.clone(),
            last_modified: self.last_modified,
        }
    }

    /// Deterministic identity key used to find prior upload progress.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.info())
    }

    /// Opens the byte source for chunked reading.
    pub fn open_reader(&self, chunk_size: usize) -> Result<ChunkReader, TransferError> {
        ChunkReader::new(&self.path, chunk_size)
    }
}
