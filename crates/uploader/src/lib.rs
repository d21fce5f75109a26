//! Resumable upload client.
//!
//! A caller builds an [`Uploader`] from [`UploaderOptions`] and a
//! [`ResumeStore`](skylift_transfer::ResumeStore), adds files, and drives
//! them with [`start`](Uploader::start) (or lets `auto_start` do it).
//! Each file runs as one sequential session: negotiate a destination,
//! resolve the starting offset from the resume store and a remote probe,
//! then stream fixed-size chunks until complete. Progress and terminal
//! state arrive on the event channel returned by
//! [`take_events`](Uploader::take_events).

mod config;
mod endpoint;
mod error;
mod negotiate;
mod retry;
mod session;
mod transport;
mod types;
mod uploader;

pub use config::{Restrictions, UploaderOptions};
pub use endpoint::{HttpEndpoint, UploadEndpoint};
pub use error::{ChunkError, NegotiationError, UploadError};
pub use negotiate::Negotiator;
pub use retry::{RetrySchedule, with_retry};
pub use transport::{ChunkAck, ChunkTransport};
pub use types::{SessionResult, UploadEvent};
pub use uploader::Uploader;
