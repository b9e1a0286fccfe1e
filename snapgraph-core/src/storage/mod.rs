/*!
Storage adapters for named snapshot files.

The codec encodes a snapshot fully in memory and then hands the bytes to a
[`StorageAdapter`] under a key. Keys are file names as produced by
[`SnapshotCodec::get_filename`](crate::SnapshotCodec::get_filename).
*/

pub mod local;
pub mod memory;

use std::path::PathBuf;

use crate::Result;

pub use local::LocalFileStorage;
pub use memory::MemoryStorage;

/// Storage abstraction for saving and loading snapshot bytes
pub trait StorageAdapter {
    /// Store `data` under `key`, replacing any previous content
    fn save(&self, data: &[u8], key: &str) -> Result<()>;

    /// Read the bytes stored under `key`
    fn load(&self, key: &str) -> Result<Vec<u8>>;

    /// Check if something is stored under `key`
    fn exists(&self, key: &str) -> bool;

    /// Delete whatever is stored under `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Where `key` lives. Keys with a directory component are used as they are;
    /// bare names are placed in the adapter's storage directory.
    fn locate(&self, key: &str) -> PathBuf;
}

/// Whether `name` carries a directory component.
pub(crate) fn has_directory(name: &str) -> bool {
    std::path::Path::new(name)
        .parent()
        .map(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_directory() {
        assert!(!has_directory("save1.bin"));
        assert!(!has_directory("save1"));
        assert!(has_directory("slots/save1.bin"));
        assert!(has_directory("/var/saves/save1"));
    }
}
