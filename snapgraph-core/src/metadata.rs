/*!
Reports describing a finished save or load.

Reports are returned to the caller and never written into the snapshot
itself, which keeps two saves of the same hierarchy byte-identical.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::format::SnapshotFormat;
use crate::{Result, SnapshotError};

/// Outcome of a save.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SnapshotReport {
    /// Unique identifier of this save
    pub snapshot_id: String,

    /// When the save finished
    pub timestamp: DateTime<Utc>,

    /// Format the snapshot was written in
    pub format: SnapshotFormat,

    /// SHA-256 of the bytes handed to the target
    pub content_hash: String,

    /// Number of bytes handed to the target
    pub size_bytes: usize,

    /// Template entries written
    pub templates_written: usize,

    /// Template instances skipped because their template is not registered
    pub templates_skipped: usize,

    /// Component entries written
    pub components_written: usize,

    /// Compression algorithm, for compressed formats
    pub compression_algorithm: Option<String>,
}

impl SnapshotReport {
    pub fn new(format: SnapshotFormat) -> Self {
        Self {
            snapshot_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            format,
            content_hash: String::new(),
            size_bytes: 0,
            templates_written: 0,
            templates_skipped: 0,
            components_written: 0,
            compression_algorithm: None,
        }
    }

    /// Record hash and size of the final bytes.
    pub fn with_content(mut self, bytes: &[u8]) -> Self {
        self.content_hash = Self::compute_hash(bytes);
        self.size_bytes = bytes.len();
        self
    }

    pub fn with_compression_algorithm<S: Into<String>>(mut self, algorithm: S) -> Self {
        self.compression_algorithm = Some(algorithm.into());
        self
    }

    /// Hex encoded SHA-256 of `data`.
    pub fn compute_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    /// Check that `bytes` are exactly the bytes this report describes.
    pub fn verify_integrity(&self, bytes: &[u8]) -> Result<()> {
        let computed_hash = Self::compute_hash(bytes);
        if computed_hash == self.content_hash {
            Ok(())
        } else {
            Err(SnapshotError::IntegrityCheckFailed {
                expected: self.content_hash.clone(),
                actual: computed_hash,
            })
        }
    }
}

/// Outcome of a load.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Template instances destroyed before reading
    pub instances_destroyed: usize,

    /// Template instances spawned from the snapshot
    pub templates_spawned: usize,

    /// Template entries skipped (unknown template or unresolvable parent)
    pub templates_skipped: usize,

    /// Components whose fields were read and whose post-load hook ran
    pub components_loaded: usize,

    /// Component entries that could not be resolved or decoded
    pub components_skipped: usize,

    /// References that resolved to nothing
    pub unresolved_references: usize,

    /// Sections whose remaining entries were abandoned due to bad framing
    pub sections_aborted: usize,
}

impl LoadReport {
    /// Whether the load restored everything the snapshot described.
    pub fn is_clean(&self) -> bool {
        self.templates_skipped == 0
            && self.components_skipped == 0
            && self.unresolved_references == 0
            && self.sections_aborted == 0
    }
}
