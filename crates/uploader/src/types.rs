//! Caller-facing event and result types.

use std::time::Duration;

use skylift_protocol::types::{UploadDestination, UploadProgress, UploadStatus};

use crate::error::UploadError;

/// Events emitted while a session runs.
///
/// Exactly one of `Succeeded`/`Failed` fires per session; a cancelled
/// session fires neither, only a `StateChanged` into
/// [`UploadStatus::Cancelled`].
#[derive(Debug)]
pub enum UploadEvent {
    /// The session moved to a new lifecycle state.
    StateChanged {
        session_id: String,
        state: UploadStatus,
    },
    /// A chunk was acknowledged.
    Progress {
        session_id: String,
        progress: UploadProgress,
        /// Transfer rate over the recent window, bytes/second.
        bytes_per_second: f64,
        /// Estimated time remaining, when the rate is known.
        eta: Option<Duration>,
    },
    /// The upload completed; the destination is the final handle.
    Succeeded {
        session_id: String,
        destination: UploadDestination,
        bytes_total: u64,
    },
    /// The upload failed terminally. Resume state for the durably
    /// acknowledged bytes is preserved.
    Failed {
        session_id: String,
        error: UploadError,
        bytes_acknowledged: u64,
    },
}

/// Summary of one finished session, returned from the driving call.
#[derive(Debug)]
pub struct SessionResult {
    pub session_id: String,
    pub file_name: String,
    /// Terminal status: `Completed`, `Failed`, or `Cancelled`.
    pub status: UploadStatus,
    pub error: Option<String>,
    /// Bytes the server had acknowledged when the session ended.
    pub bytes_uploaded: u64,
}

impl SessionResult {
    pub fn succeeded(&self) -> bool {
        self.status == UploadStatus::Completed
    }
}
