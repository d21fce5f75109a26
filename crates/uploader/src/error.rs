//! Error taxonomy for the upload client.
//!
//! Three layers: [`NegotiationError`] for the handshake (never retried),
//! [`ChunkError`] for chunk-protocol operations (split into retryable and
//! fatal variants), and [`UploadError`] as the terminal classification a
//! session reports.

use skylift_transfer::TransferError;

/// Failure of the negotiation handshake.
///
/// Variants carry the raw response body for diagnostics. Resumability
/// begins only after a destination exists, so none of these are retried
/// at this layer.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    /// The request never produced a response.
    #[error("negotiation request failed: {0}")]
    Request(String),

    /// Non-2xx HTTP response.
    #[error("negotiation rejected (status {status}): {body}")]
    Rejected { status: u16, body: String },

    /// 2xx response with an application-level `success: false`.
    #[error("negotiation declined by server: {body}")]
    Declined { body: String },

    /// Response body did not parse as the negotiation contract.
    #[error("malformed negotiation response: {0}")]
    Malformed(String),
}

/// Failure of a single chunk-protocol operation (send or probe).
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// Connection-level failure. Retryable.
    #[error("network error: {0}")]
    Network(String),

    /// Inactivity timeout. Retryable.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The destination rejected the request (4xx). The destination is
    /// invalid or expired; retrying the same request cannot succeed.
    #[error("destination rejected request (status {status})")]
    Rejected { status: u16 },

    /// The server-acknowledged offset does not match what was sent.
    /// Indicates corrupted resume state; the session must be restarted
    /// from scratch by the caller, never silently from 0.
    #[error("offset mismatch: expected {expected}, server reported {actual}")]
    OffsetMismatch { expected: u64, actual: u64 },

    /// The response violated the chunk protocol (e.g. missing offset
    /// header).
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Local byte-source failure.
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl ChunkError {
    /// Whether the retry controller may consume a schedule slot for this
    /// failure. Everything else propagates immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

/// Terminal classification of a failed (or rejected) upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    /// The file or batch violated the configured restrictions. Reported
    /// before any network activity.
    #[error("restriction violated: {0}")]
    Restriction(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// The caller cancelled the session. Surfaces internally; sessions
    /// translate it into the Cancelled state, not an error event.
    #[error("cancelled")]
    Cancelled,
}
