use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::negotiate::DestinationInfo;

/// Metadata identifying a file to upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    /// Last modification time, milliseconds since the Unix epoch.
    #[serde(default)]
    pub last_modified: i64,
}

/// A negotiated upload destination. Immutable for the life of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDestination {
    /// URL chunk requests are sent to.
    pub endpoint: String,
    /// Headers merged into every chunk request.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Server-side collection the upload lands in.
    pub collection: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
}

impl UploadDestination {
    /// Builds a destination from negotiation response data plus the file
    /// metadata the request was made for.
    pub fn from_negotiation(info: DestinationInfo, file: &FileInfo) -> Self {
        Self {
            endpoint: info.endpoint,
            headers: info.headers,
            collection: info.collection,
            title: file.name.clone(),
            content_type: file.content_type.clone(),
        }
    }
}

/// Current state of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "negotiating")]
    Negotiating,
    #[serde(rename = "resuming")]
    Resuming,
    #[serde(rename = "transferring")]
    Transferring,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl UploadStatus {
    /// Returns `true` for the three states no transition leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Progress of an active upload. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub bytes_uploaded: u64,
    pub bytes_total: u64,
}

impl UploadProgress {
    /// Returns progress as a percentage (0–100).
    pub fn percent(&self) -> f64 {
        if self.bytes_total == 0 {
            return 0.0;
        }
        self.bytes_uploaded as f64 / self.bytes_total as f64 * 100.0
    }
}

/// Persisted resume state for one fingerprint.
///
/// The destination doubles as the session handle: resuming means sending
/// chunks to the same endpoint the interrupted session used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRecord {
    pub destination: UploadDestination,
    /// Last server-acknowledged byte offset.
    pub offset: u64,
    pub updated_at: DateTime<Utc>,
}
