//! One upload session: the lifecycle state machine for a single file.
//!
//! Driven by [`Uploader`](crate::Uploader); kept separate so the whole
//! pipeline is testable against a scripted endpoint.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use skylift_protocol::types::{ResumeRecord, UploadDestination, UploadProgress, UploadStatus};
use skylift_transfer::{FileDescriptor, ResumeStore, SpeedCalculator};

use crate::config::UploaderOptions;
use crate::endpoint::UploadEndpoint;
use crate::error::UploadError;
use crate::negotiate::Negotiator;
use crate::retry::with_retry;
use crate::transport::ChunkTransport;
use crate::types::{SessionResult, UploadEvent};

/// Builds the endpoint a session sends chunks to, from the destination
/// and the total upload size. The seam that lets tests swap HTTP out.
pub(crate) type EndpointFactory =
    dyn Fn(&UploadDestination, u64) -> Arc<dyn UploadEndpoint> + Send + Sync;

/// Orchestrates one file through
/// negotiate → resume lookup → probe → chunk loop → terminal state.
pub(crate) struct Session<'a> {
    id: String,
    options: &'a UploaderOptions,
    negotiator: &'a Negotiator,
    store: &'a dyn ResumeStore,
    endpoint_factory: &'a EndpointFactory,
    events_tx: &'a mpsc::Sender<UploadEvent>,
    cancel: CancellationToken,
}

impl<'a> Session<'a> {
    pub(crate) fn new(
        options: &'a UploaderOptions,
        negotiator: &'a Negotiator,
        store: &'a dyn ResumeStore,
        endpoint_factory: &'a EndpointFactory,
        events_tx: &'a mpsc::Sender<UploadEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            options,
            negotiator,
            store,
            endpoint_factory,
            events_tx,
            cancel,
        }
    }

    /// Runs the session to a terminal state. Emits exactly one
    /// `Succeeded`/`Failed` event, or neither when cancelled.
    pub(crate) async fn run(&self, file: &FileDescriptor) -> SessionResult {
        info!(
            session = %self.id,
            file = %file.name,
            size = file.size,
            "starting upload session"
        );
        let fingerprint = file.fingerprint();

        // Negotiate a fresh destination. It is only used when no resume
        // record exists: resuming means continuing the prior session.
        self.set_state(UploadStatus::Negotiating).await;
        if self.cancel.is_cancelled() {
            return self.cancelled(file, 0).await;
        }
        let fresh = match self.negotiator.negotiate(&file.info()).await {
            Ok(destination) => destination,
            Err(e) => return self.fail(file, e.into(), 0).await,
        };

        // Resolve the starting offset from the local record and a remote
        // probe; the larger wins.
        self.set_state(UploadStatus::Resuming).await;
        let (destination, local_offset) = match self.store.get(&fingerprint) {
            Ok(Some(record)) => {
                debug!(
                    session = %self.id,
                    offset = record.offset,
                    "resume record found, continuing prior session"
                );
                (record.destination, record.offset)
            }
            Ok(None) => (fresh, 0),
            Err(e) => {
                warn!(session = %self.id, error = %e, "resume lookup failed, starting fresh");
                (fresh, 0)
            }
        };

        let endpoint = (self.endpoint_factory)(&destination, file.size);
        let mut transport = match ChunkTransport::open(
            file,
            endpoint,
            local_offset,
            self.options.effective_chunk_size(),
        ) {
            Ok(t) => t,
            Err(e) => return self.fail(file, e, local_offset).await,
        };

        let probed = with_retry(&self.options.retry_schedule, &self.cancel, async || {
            transport.probe_remote_offset().await
        })
        .await;
        match probed {
            Ok(start) => debug!(session = %self.id, start, "resolved starting offset"),
            Err(UploadError::Cancelled) => {
                return self.cancelled(file, transport.acked_offset()).await;
            }
            Err(e) => return self.fail(file, e, transport.acked_offset()).await,
        }

        // Chunk loop. Each acknowledgment updates the resume record
        // before progress is reported, so persisted state never lags the
        // server by more than one chunk.
        self.set_state(UploadStatus::Transferring).await;
        let speed = SpeedCalculator::new(None);
        self.emit_progress(transport.acked_offset(), transport.total_size(), &speed)
            .await;

        while !transport.is_complete() {
            if self.cancel.is_cancelled() {
                return self.cancelled(file, transport.acked_offset()).await;
            }

            let sent = with_retry(&self.options.retry_schedule, &self.cancel, async || {
                transport.send_next_chunk().await
            })
            .await;
            let ack = match sent {
                Ok(Some(ack)) => ack,
                Ok(None) => break,
                Err(UploadError::Cancelled) => {
                    return self.cancelled(file, transport.acked_offset()).await;
                }
                Err(e) => return self.fail(file, e, transport.acked_offset()).await,
            };

            if self.options.debug {
                debug!(
                    session = %self.id,
                    offset = ack.offset,
                    bytes = ack.bytes,
                    "chunk acknowledged"
                );
            }

            let record = ResumeRecord {
                destination: destination.clone(),
                offset: ack.offset,
                updated_at: Utc::now(),
            };
            if let Err(e) = self.store.put(&fingerprint, record) {
                warn!(session = %self.id, error = %e, "failed to persist resume record");
            }

            speed.record(ack.bytes);
            self.emit_progress(ack.offset, transport.total_size(), &speed)
                .await;
        }

        // Clear the record before the success event fires: completion
        // implies record absence. A failed delete is logged, not fatal.
        if let Err(e) = self.store.delete(&fingerprint) {
            warn!(session = %self.id, error = %e, "failed to clear resume record");
        }

        self.set_state(UploadStatus::Completed).await;
        let bytes_total = transport.total_size();
        self.emit(UploadEvent::Succeeded {
            session_id: self.id.clone(),
            destination,
            bytes_total,
        })
        .await;
        info!(session = %self.id, file = %file.name, bytes = bytes_total, "upload completed");

        SessionResult {
            session_id: self.id.clone(),
            file_name: file.name.clone(),
            status: UploadStatus::Completed,
            error: None,
            bytes_uploaded: bytes_total,
        }
    }

    async fn fail(&self, file: &FileDescriptor, error: UploadError, acked: u64) -> SessionResult {
        let message = error.to_string();
        error!(
            session = %self.id,
            file = %file.name,
            error = %message,
            acked,
            "upload failed"
        );
        self.set_state(UploadStatus::Failed).await;
        self.emit(UploadEvent::Failed {
            session_id: self.id.clone(),
            error,
            bytes_acknowledged: acked,
        })
        .await;
        SessionResult {
            session_id: self.id.clone(),
            file_name: file.name.clone(),
            status: UploadStatus::Failed,
            error: Some(message),
            bytes_uploaded: acked,
        }
    }

    /// Cancellation is not a failure: the record stays for a future
    /// resume and neither terminal event fires.
    async fn cancelled(&self, file: &FileDescriptor, acked: u64) -> SessionResult {
        info!(session = %self.id, file = %file.name, acked, "upload cancelled");
        self.set_state(UploadStatus::Cancelled).await;
        SessionResult {
            session_id: self.id.clone(),
            file_name: file.name.clone(),
            status: UploadStatus::Cancelled,
            error: None,
            bytes_uploaded: acked,
        }
    }

    async fn set_state(&self, state: UploadStatus) {
        self.emit(UploadEvent::StateChanged {
            session_id: self.id.clone(),
            state,
        })
        .await;
    }

    async fn emit_progress(&self, bytes_uploaded: u64, bytes_total: u64, speed: &SpeedCalculator) {
        let progress = UploadProgress {
            bytes_uploaded,
            bytes_total,
        };
        self.emit(UploadEvent::Progress {
            session_id: self.id.clone(),
            progress,
            bytes_per_second: speed.bytes_per_second(),
            eta: speed.eta(bytes_total.saturating_sub(bytes_uploaded)),
        })
        .await;
    }

    async fn emit(&self, event: UploadEvent) {
        let _ = self.events_tx.send(event).await;
    }
}
