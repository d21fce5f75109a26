use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::trace;

use skylift_protocol::constants::{
    CHECKSUM_HEADER, CHUNK_CONTENT_TYPE, LENGTH_HEADER, OFFSET_HEADER,
};
use skylift_protocol::types::UploadDestination;

use crate::error::ChunkError;

/// Abstract connection to an upload destination.
///
/// Chunk transport logic is written against this trait so it can be
/// exercised with mocks; [`HttpEndpoint`] is the real implementation.
pub trait UploadEndpoint: Send + Sync {
    /// Transmits `data` starting at `offset`. Resolves to the offset the
    /// server acknowledges as durable after this request.
    fn send_chunk(
        &self,
        offset: u64,
        data: Vec<u8>,
        checksum: String,
    ) -> Pin<Box<dyn Future<Output = Result<u64, ChunkError>> + Send + '_>>;

    /// Asks the server how many bytes it has durably stored for this
    /// destination. `None` means the server has no record of it.
    fn probe_offset(&self)
    -> Pin<Box<dyn Future<Output = Result<Option<u64>, ChunkError>> + Send + '_>>;
}

/// HTTP implementation of the chunk protocol.
///
/// Chunks go out as PATCH requests carrying `Upload-Offset` and
/// `Upload-Length` headers with an `application/offset+octet-stream`
/// body; the probe is a HEAD request reading `Upload-Offset` back.
/// Destination headers are merged into every request.
pub struct HttpEndpoint {
    client: reqwest::Client,
    destination: UploadDestination,
    total_size: u64,
    timeout: Duration,
}

impl HttpEndpoint {
    pub fn new(
        client: reqwest::Client,
        destination: UploadDestination,
        total_size: u64,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            destination,
            total_size,
            timeout,
        }
    }

    fn apply_destination_headers(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in &self.destination.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        req
    }
}

fn classify_request_error(e: reqwest::Error) -> ChunkError {
    if e.is_timeout() {
        ChunkError::Timeout(e.to_string())
    } else {
        ChunkError::Network(e.to_string())
    }
}

/// Maps a non-2xx chunk-protocol status: 4xx means the destination is
/// invalid or expired, anything else is treated as transient.
fn classify_status(status: reqwest::StatusCode) -> ChunkError {
    if status.is_client_error() {
        ChunkError::Rejected {
            status: status.as_u16(),
        }
    } else {
        ChunkError::Network(format!("server error: status {status}"))
    }
}

fn parse_offset_header(headers: &reqwest::header::HeaderMap) -> Result<Option<u64>, ChunkError> {
    let Some(value) = headers.get(OFFSET_HEADER) else {
        return Ok(None);
    };
    let text = value
        .to_str()
        .map_err(|e| ChunkError::Malformed(format!("bad {OFFSET_HEADER} header: {e}")))?;
    let offset = text
        .parse::<u64>()
        .map_err(|e| ChunkError::Malformed(format!("bad {OFFSET_HEADER} header: {e}")))?;
    Ok(Some(offset))
}

impl UploadEndpoint for HttpEndpoint {
    fn send_chunk(
        &self,
        offset: u64,
        data: Vec<u8>,
        checksum: String,
    ) -> Pin<Box<dyn Future<Output = Result<u64, ChunkError>> + Send + '_>> {
        Box::pin(async move {
            trace!(
                endpoint = %self.destination.endpoint,
                offset,
                len = data.len(),
                "sending chunk"
            );
            let req = self
                .client
                .patch(&self.destination.endpoint)
                .timeout(self.timeout)
                .header(reqwest::header::CONTENT_TYPE, CHUNK_CONTENT_TYPE)
                .header(OFFSET_HEADER, offset.to_string())
                .header(LENGTH_HEADER, self.total_size.to_string())
                .header(CHECKSUM_HEADER, checksum);
            let req = self.apply_destination_headers(req);

            let resp = req.body(data).send().await.map_err(classify_request_error)?;

            let status = resp.status();
            if !status.is_success() {
                return Err(classify_status(status));
            }

            parse_offset_header(resp.headers())?.ok_or_else(|| {
                ChunkError::Malformed(format!("chunk response missing {OFFSET_HEADER} header"))
            })
        })
    }

    fn probe_offset(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<u64>, ChunkError>> + Send + '_>> {
        Box::pin(async move {
            let req = self
                .client
                .head(&self.destination.endpoint)
                .timeout(self.timeout);
            let req = self.apply_destination_headers(req);

            let resp = req.send().await.map_err(classify_request_error)?;

            let status = resp.status();
            // Gone or never-seen destinations have nothing to resume.
            if status == reqwest::StatusCode::NOT_FOUND
                || status == reqwest::StatusCode::GONE
            {
                return Ok(None);
            }
            if !status.is_success() {
                return Err(classify_status(status));
            }

            parse_offset_header(resp.headers())
        })
    }
}
