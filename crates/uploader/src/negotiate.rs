use std::time::Duration;

use tracing::debug;

use skylift_protocol::negotiate::{NegotiateRequest, NegotiateResponse};
use skylift_protocol::types::{FileInfo, UploadDestination};

use crate::error::NegotiationError;

/// Client for the negotiation handshake.
///
/// One POST per upload; no retry at this layer. The orchestrator owns the
/// decision of whether a failed negotiation is worth a second session.
pub struct Negotiator {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl Negotiator {
    /// Creates a negotiator against `endpoint`.
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        }
    }

    /// Obtains an upload destination for `file`.
    ///
    /// Non-2xx status and application-level `success: false` are both
    /// negotiation errors; the raw response body is preserved either way.
    pub async fn negotiate(&self, file: &FileInfo) -> Result<UploadDestination, NegotiationError> {
        let req = NegotiateRequest {
            title: file.name.clone(),
            size: file.size,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&req)
            .send()
            .await
            .map_err(|e| NegotiationError::Request(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| NegotiationError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(NegotiationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: NegotiateResponse =
            serde_json::from_str(&body).map_err(|e| NegotiationError::Malformed(e.to_string()))?;

        match parsed {
            NegotiateResponse {
                success: true,
                data: Some(info),
            } => {
                debug!(
                    file = %file.name,
                    endpoint = %info.endpoint,
                    collection = %info.collection,
                    "negotiated upload destination"
                );
                Ok(UploadDestination::from_negotiation(info, file))
            }
            _ => Err(NegotiationError::Declined { body }),
        }
    }
}
