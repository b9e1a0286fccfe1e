/*!
Local filesystem storage adapter implementation.
*/

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use super::{has_directory, StorageAdapter};
use crate::{Result, SnapshotError};

/// Local filesystem storage adapter
///
/// Writes go to a temporary file in the target directory which is then renamed
/// over the target, so a failed save never leaves a half-written snapshot.
/// Missing parent directories are created.
///
/// # Example
/// ```rust
/// use snapgraph_core::storage::{LocalFileStorage, StorageAdapter};
///
/// let dir = tempfile::tempdir()?;
/// let storage = LocalFileStorage::with_base_dir(dir.path());
/// storage.save(b"SNPG", "slot1.bin")?;
/// assert_eq!(storage.load("slot1.bin")?, b"SNPG");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct LocalFileStorage {
    /// Persistent-storage directory for bare file names
    base_dir: Option<PathBuf>,
}

impl LocalFileStorage {
    /// Adapter without a storage directory: bare names resolve against the
    /// working directory.
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Adapter placing bare file names in `base_dir`.
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: Some(base_dir.as_ref().to_path_buf()),
        }
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Ensure the parent directory exists, creating it if necessary
    fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    SnapshotError::storage(format!(
                        "Failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }
}

impl StorageAdapter for LocalFileStorage {
    fn save(&self, data: &[u8], key: &str) -> Result<()> {
        let full_path = self.locate(key);
        self.ensure_parent_dir(&full_path)?;

        let dir = match full_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut staged = NamedTempFile::new_in(&dir).map_err(|e| {
            SnapshotError::storage(format!(
                "Failed to stage snapshot in {}: {}",
                dir.display(),
                e
            ))
        })?;
        staged.write_all(data)?;
        staged.as_file().sync_all()?;
        staged.persist(&full_path).map_err(|e| {
            SnapshotError::storage(format!(
                "Failed to write snapshot to {}: {}",
                full_path.display(),
                e.error
            ))
        })?;

        debug!(path = %full_path.display(), size = data.len(), "snapshot written");
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Vec<u8>> {
        let full_path = self.locate(key);

        fs::read(&full_path).map_err(|e| {
            SnapshotError::storage(format!(
                "Failed to read snapshot from {}: {}",
                full_path.display(),
                e
            ))
        })
    }

    fn exists(&self, key: &str) -> bool {
        self.locate(key).exists()
    }

    fn delete(&self, key: &str) -> Result<()> {
        let full_path = self.locate(key);

        if full_path.exists() {
            fs::remove_file(&full_path).map_err(|e| {
                SnapshotError::storage(format!(
                    "Failed to delete snapshot {}: {}",
                    full_path.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }

    fn locate(&self, key: &str) -> PathBuf {
        match &self.base_dir {
            Some(base) if !has_directory(key) => base.join(key),
            _ => PathBuf::from(key),
        }
    }
}
