use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use skylift_protocol::types::ResumeRecord;

use crate::{Fingerprint, TransferError};

/// Keyed persistence for resume state.
///
/// One record per fingerprint. Keys are independent: sessions for
/// different files never contend on each other's entries. Implementations
/// must be safe to share across sessions (`Send + Sync`).
pub trait ResumeStore: Send + Sync {
    /// Returns the record for `fingerprint`, if any.
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ResumeRecord>, TransferError>;

    /// Inserts or replaces the record for `fingerprint`.
    fn put(&self, fingerprint: &Fingerprint, record: ResumeRecord) -> Result<(), TransferError>;

    /// Removes the record for `fingerprint`. Removing an absent key is not
    /// an error.
    fn delete(&self, fingerprint: &Fingerprint) -> Result<(), TransferError>;
}

/// In-memory resume store. State is lost on process exit; useful for tests
/// and for callers that only want within-process resumption.
#[derive(Default)]
pub struct MemoryResumeStore {
    records: RwLock<HashMap<String, ResumeRecord>>,
}

impl MemoryResumeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResumeStore for MemoryResumeStore {
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ResumeRecord>, TransferError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(fingerprint.as_str()).cloned())
    }

    fn put(&self, fingerprint: &Fingerprint, record: ResumeRecord) -> Result<(), TransferError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(fingerprint.as_str().to_string(), record);
        Ok(())
    }

    fn delete(&self, fingerprint: &Fingerprint) -> Result<(), TransferError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.remove(fingerprint.as_str());
        Ok(())
    }
}

/// Resume store backed by a single JSON file.
///
/// The whole map is loaded on open and rewritten after each mutation, so
/// on-disk state never lags the last acknowledged chunk by more than one
/// write. The file is created lazily on the first `put`.
pub struct JsonResumeStore {
    path: PathBuf,
    records: RwLock<HashMap<String, ResumeRecord>>,
}

impl JsonResumeStore {
    /// Opens the store at `path`, loading existing records if the file
    /// exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TransferError> {
        let path = path.into();
        let records = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &HashMap<String, ResumeRecord>) -> Result<(), TransferError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(records)?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }
}

impl ResumeStore for JsonResumeStore {
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ResumeRecord>, TransferError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(fingerprint.as_str()).cloned())
    }

    fn put(&self, fingerprint: &Fingerprint, record: ResumeRecord) -> Result<(), TransferError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(fingerprint.as_str().to_string(), record);
        self.persist(&records)
    }

    fn delete(&self, fingerprint: &Fingerprint) -> Result<(), TransferError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.remove(fingerprint.as_str()).is_some() {
            return self.persist(&records);
        }
        Ok(())
    }
}
