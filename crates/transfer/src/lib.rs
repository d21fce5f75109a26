//! Local byte handling for resumable uploads.
//!
//! Everything on the client side of the wire that touches bytes or disk:
//! chunked file reading with checksums, file fingerprints, and the resume
//! store that maps a fingerprint to the last acknowledged offset.

mod chunked;
mod file;
mod fingerprint;
mod progress;
mod resume;

pub use chunked::{Chunk, ChunkReader, checksum_bytes};
pub use file::FileDescriptor;
pub use fingerprint::Fingerprint;
pub use progress::SpeedCalculator;
pub use resume::{JsonResumeStore, MemoryResumeStore, ResumeStore};

/// Default chunk size: 3 MiB.
///
/// Not protocol-significant, purely a tradeoff between per-request
/// overhead and the cost of re-sending one chunk after a failed attempt.
pub const DEFAULT_CHUNK_SIZE: usize = 3 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("offset {offset} is beyond file size {size}")]
    OffsetOutOfRange { offset: u64, size: u64 },
}
