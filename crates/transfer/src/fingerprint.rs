use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use skylift_protocol::types::FileInfo;

/// Deterministic identity key for a logical file.
///
/// Hex SHA-256 over name, size, content type, and last-modified time with
/// explicit separators, so `("ab", "c")` and `("a", "bc")` hash apart.
/// Stable across process restarts for the same logical file; any change to
/// the file's metadata yields a different fingerprint, which is what makes
/// a stale resume offset unreachable rather than dangerous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derives the fingerprint for a file's metadata.
    pub fn of(info: &FileInfo) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(info.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(info.size.to_le_bytes());
        hasher.update([0u8]);
        hasher.update(info.content_type.as_bytes());
        hasher.update([0u8]);
        hasher.update(info.last_modified.to_le_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
