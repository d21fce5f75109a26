use std::sync::Arc;

use tracing::{debug, trace};

use skylift_transfer::{ChunkReader, FileDescriptor};

use crate::endpoint::UploadEndpoint;
use crate::error::{ChunkError, UploadError};

/// One acknowledged chunk.
#[derive(Debug, Clone, Copy)]
pub struct ChunkAck {
    /// Server-acknowledged offset after this chunk.
    pub offset: u64,
    /// Bytes this chunk carried.
    pub bytes: u64,
}

/// Moves bytes from a local file to an upload destination in fixed-size
/// chunks, strictly in offset order.
///
/// Owns the session's mutable state: the acknowledged offset only ever
/// increases, and only after the server confirms a chunk. Reads re-seek
/// to the acknowledged offset each time, so a retried send re-reads the
/// exact range the failed attempt covered.
pub struct ChunkTransport {
    endpoint: Arc<dyn UploadEndpoint>,
    // Taken while a read runs on the blocking pool, then put back.
    reader: Option<ChunkReader>,
    acked: u64,
    total: u64,
}

impl ChunkTransport {
    /// Binds destination, byte source, and starting offset.
    ///
    /// `start_offset` is 0 for a fresh session or the resumed offset; an
    /// offset beyond the file size is corrupted resume state and is
    /// rejected here, before any network traffic.
    pub fn open(
        file: &FileDescriptor,
        endpoint: Arc<dyn UploadEndpoint>,
        start_offset: u64,
        chunk_size: usize,
    ) -> Result<Self, UploadError> {
        let mut reader = file.open_reader(chunk_size)?;
        reader.seek_to(start_offset)?;
        let total = reader.size();
        Ok(Self {
            endpoint,
            reader: Some(reader),
            acked: start_offset,
            total,
        })
    }

    /// Queries the server for its durable offset and adopts it when it is
    /// ahead of the local one. The server is the source of truth for
    /// durability; a stale local record must not cause a re-send of bytes
    /// the server already has.
    ///
    /// Returns the resolved starting offset.
    pub async fn probe_remote_offset(&mut self) -> Result<u64, ChunkError> {
        if let Some(remote) = self.endpoint.probe_offset().await? {
            trace!(remote, local = self.acked, "probed remote offset");
            if remote > self.total {
                return Err(ChunkError::OffsetMismatch {
                    expected: self.total,
                    actual: remote,
                });
            }
            if remote > self.acked {
                debug!(
                    local = self.acked,
                    remote, "remote offset ahead of local record, adopting"
                );
                self.acked = remote;
            }
        }
        Ok(self.acked)
    }

    /// Reads and transmits the next chunk. Returns `None` when the file
    /// is exhausted.
    ///
    /// The acknowledged offset advances only when the server confirms
    /// exactly the bytes sent; any other confirmation is a protocol
    /// error.
    pub async fn send_next_chunk(&mut self) -> Result<Option<ChunkAck>, ChunkError> {
        let mut reader = match self.reader.take() {
            Some(r) => r,
            None => {
                return Err(ChunkError::Malformed(
                    "chunk reader lost by an earlier failed read".into(),
                ));
            }
        };

        let resume_at = self.acked;
        let (reader, chunk) = tokio::task::spawn_blocking(move || {
            let chunk = match reader.seek_to(resume_at) {
                Ok(()) => reader.next_chunk(),
                Err(e) => Err(e),
            };
            (reader, chunk)
        })
        .await
        .map_err(|e| {
            ChunkError::Transfer(skylift_transfer::TransferError::Io(std::io::Error::other(
                format!("chunk read task failed: {e}"),
            )))
        })?;
        self.reader = Some(reader);

        let Some(chunk) = chunk? else {
            return Ok(None);
        };

        let bytes = chunk.data.len() as u64;
        let expected = chunk.offset + bytes;
        let confirmed = self
            .endpoint
            .send_chunk(chunk.offset, chunk.data, chunk.checksum)
            .await?;

        if confirmed != expected {
            return Err(ChunkError::OffsetMismatch {
                expected,
                actual: confirmed,
            });
        }

        self.acked = confirmed;
        Ok(Some(ChunkAck {
            offset: confirmed,
            bytes,
        }))
    }

    /// Whether every byte has been acknowledged.
    pub fn is_complete(&self) -> bool {
        self.acked >= self.total
    }

    /// Last server-acknowledged offset.
    pub fn acked_offset(&self) -> u64 {
        self.acked
    }

    /// Total size of the byte source.
    pub fn total_size(&self) -> u64 {
        self.total
    }
}
