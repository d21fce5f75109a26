use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use skylift_protocol::types::UploadDestination;
use skylift_transfer::{FileDescriptor, ResumeStore};

use crate::config::UploaderOptions;
use crate::endpoint::{HttpEndpoint, UploadEndpoint};
use crate::error::UploadError;
use crate::negotiate::Negotiator;
use crate::session::{EndpointFactory, Session};
use crate::types::{SessionResult, UploadEvent};

/// The upload client a caller constructs and drives.
///
/// One uploader per call site, configured by [`UploaderOptions`]; there
/// is deliberately no shared global instance. Files added while
/// `auto_start` is off queue until [`start`](Self::start); each file then
/// runs as one independent session against the shared resume store.
/// Lifecycle, progress, and terminal events arrive on the channel
/// returned by [`take_events`](Self::take_events).
pub struct Uploader {
    options: UploaderOptions,
    negotiator: Negotiator,
    store: Arc<dyn ResumeStore>,
    endpoint_factory: Box<EndpointFactory>,
    queue: Vec<FileDescriptor>,
    batches_started: u32,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    cancel: CancellationToken,
}

impl Uploader {
    /// Creates an uploader over the given resume store.
    pub fn new(options: UploaderOptions, store: Arc<dyn ResumeStore>) -> Self {
        let client = reqwest::Client::new();
        let negotiator = Negotiator::new(
            client.clone(),
            options.endpoint.clone(),
            options.inactivity_timeout,
        );
        let timeout = options.inactivity_timeout;
        let endpoint_factory: Box<EndpointFactory> =
            Box::new(move |destination: &UploadDestination, total_size: u64| {
                Arc::new(HttpEndpoint::new(
                    client.clone(),
                    destination.clone(),
                    total_size,
                    timeout,
                )) as Arc<dyn UploadEndpoint>
            });
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            options,
            negotiator,
            store,
            endpoint_factory,
            queue: Vec::new(),
            batches_started: 0,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Returns a token that cancels every session of this uploader.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Accepts a file after checking the per-file restrictions.
    ///
    /// With `auto_start` the file uploads immediately and its result is
    /// returned; otherwise it queues until [`start`](Self::start) and
    /// `None` is returned.
    pub async fn add_file(
        &mut self,
        file: FileDescriptor,
    ) -> Result<Option<SessionResult>, UploadError> {
        self.options.restrictions.check_file(&file.info())?;
        if self.options.debug {
            debug!(file = %file.name, size = file.size, "file accepted");
        }
        if self.options.auto_start {
            let result = self.run_session(&file).await;
            return Ok(Some(result));
        }
        self.queue.push(file);
        Ok(None)
    }

    /// Uploads every queued file, one independent session per file.
    ///
    /// Batch-level restrictions (file count, total size) are checked
    /// before the first session starts. A second call is rejected unless
    /// `allow_multiple_batches` is set.
    pub async fn start(&mut self) -> Result<Vec<SessionResult>, UploadError> {
        if self.batches_started > 0 && !self.options.allow_multiple_batches {
            return Err(UploadError::Restriction(
                "this uploader already ran a batch and multiple batches are disabled".into(),
            ));
        }
        let infos: Vec<_> = self.queue.iter().map(|f| f.info()).collect();
        self.options.restrictions.check_batch(&infos)?;
        self.batches_started += 1;

        let files = std::mem::take(&mut self.queue);
        let mut results = Vec::with_capacity(files.len());
        for file in &files {
            results.push(self.run_session(file).await);
        }
        Ok(results)
    }

    async fn run_session(&self, file: &FileDescriptor) -> SessionResult {
        let session = Session::new(
            &self.options,
            &self.negotiator,
            &*self.store,
            &*self.endpoint_factory,
            &self.events_tx,
            self.cancel.clone(),
        );
        session.run(file).await
    }
}
