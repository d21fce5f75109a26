//! The negotiation handshake contract.
//!
//! One POST to the negotiation endpoint obtains an upload destination.
//! Application-level failure is signalled with `success: false` rather
//! than an HTTP error, so both must be handled by the client.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Body of the negotiation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiateRequest {
    pub title: String,
    pub size: u64,
}

/// Body of the negotiation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiateResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DestinationInfo>,
}

/// Server-assigned destination details inside a successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationInfo {
    /// URL chunk requests are sent to.
    pub endpoint: String,
    /// Headers to merge into every chunk request.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Server-side collection the upload lands in.
    pub collection: String,
}
