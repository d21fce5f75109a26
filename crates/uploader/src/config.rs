use std::time::Duration;

use skylift_protocol::types::FileInfo;
use skylift_transfer::DEFAULT_CHUNK_SIZE;

use crate::UploadError;
use crate::retry::RetrySchedule;

/// Configuration for an [`Uploader`](crate::Uploader).
///
/// Everything except the negotiation endpoint has a working default.
#[derive(Debug, Clone)]
pub struct UploaderOptions {
    /// Negotiation endpoint URL.
    pub endpoint: String,
    /// Chunk size in bytes; 0 means [`DEFAULT_CHUNK_SIZE`].
    pub chunk_size: usize,
    /// Delay schedule for retrying retryable chunk failures.
    pub retry_schedule: RetrySchedule,
    /// Inactivity timeout applied to every network call.
    pub inactivity_timeout: Duration,
    /// File and batch restrictions, checked before any network activity.
    pub restrictions: Restrictions,
    /// Upload each file as soon as it is added, instead of queueing until
    /// [`start`](crate::Uploader::start).
    pub auto_start: bool,
    /// Permit more than one [`start`](crate::Uploader::start) call per
    /// uploader.
    pub allow_multiple_batches: bool,
    /// Log chunk-level detail at debug level.
    pub debug: bool,
}

impl UploaderOptions {
    /// Options with defaults for the given negotiation endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry_schedule: RetrySchedule::default(),
            inactivity_timeout: Duration::from_secs(30),
            restrictions: Restrictions::default(),
            auto_start: false,
            allow_multiple_batches: true,
            debug: false,
        }
    }

    /// Effective chunk size (resolves 0 to the default).
    pub fn effective_chunk_size(&self) -> usize {
        if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        }
    }
}

/// Limits a caller can place on files before they are accepted.
///
/// `None` means unrestricted.
#[derive(Debug, Clone, Default)]
pub struct Restrictions {
    pub max_file_size: Option<u64>,
    pub min_file_size: Option<u64>,
    pub max_total_size: Option<u64>,
    pub max_number_of_files: Option<usize>,
    pub min_number_of_files: Option<usize>,
    /// Exact content types, or `type/*` wildcards.
    pub allowed_content_types: Option<Vec<String>>,
}

impl Restrictions {
    /// Checks a single file against the per-file limits.
    pub fn check_file(&self, info: &FileInfo) -> Result<(), UploadError> {
        if let Some(max) = self.max_file_size
            && info.size > max
        {
            return Err(UploadError::Restriction(format!(
                "{} is {} bytes, larger than the {max} byte limit",
                info.name, info.size
            )));
        }
        if let Some(min) = self.min_file_size
            && info.size < min
        {
            return Err(UploadError::Restriction(format!(
                "{} is {} bytes, smaller than the {min} byte minimum",
                info.name, info.size
            )));
        }
        if let Some(ref allowed) = self.allowed_content_types
            && !allowed.iter().any(|a| content_type_matches(a, &info.content_type))
        {
            return Err(UploadError::Restriction(format!(
                "content type {} of {} is not allowed",
                info.content_type, info.name
            )));
        }
        Ok(())
    }

    /// Checks batch-level limits: file count and total size.
    pub fn check_batch(&self, files: &[FileInfo]) -> Result<(), UploadError> {
        if let Some(max) = self.max_number_of_files
            && files.len() > max
        {
            return Err(UploadError::Restriction(format!(
                "{} files exceeds the limit of {max}",
                files.len()
            )));
        }
        if let Some(min) = self.min_number_of_files
            && files.len() < min
        {
            return Err(UploadError::Restriction(format!(
                "{} files is fewer than the required {min}",
                files.len()
            )));
        }
        if let Some(max) = self.max_total_size {
            let total: u64 = files.iter().map(|f| f.size).sum();
            if total > max {
                return Err(UploadError::Restriction(format!(
                    "total size {total} exceeds the {max} byte limit"
                )));
            }
        }
        Ok(())
    }
}

/// Matches `video/mp4` against either `video/mp4` or `video/*`.
fn content_type_matches(allowed: &str, actual: &str) -> bool {
    if let Some(prefix) = allowed.strip_suffix("/*") {
        actual
            .split('/')
            .next()
            .is_some_and(|major| major == prefix)
    } else {
        allowed == actual
    }
}
