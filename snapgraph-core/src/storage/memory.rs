/*!
In-process storage adapter.
*/

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use super::StorageAdapter;
use crate::{Result, SnapshotError};

/// Keeps snapshots in a map. Useful for tests and for hosts that manage the
/// bytes themselves.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().map(|map| map.keys().cloned().collect()).unwrap_or_default();
        keys.sort();
        keys
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| SnapshotError::storage("memory storage lock poisoned"))
    }
}

impl StorageAdapter for MemoryStorage {
    fn save(&self, data: &[u8], key: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Vec<u8>> {
        self.lock()?
            .get(key)
            .cloned()
            .ok_or_else(|| SnapshotError::storage(format!("No snapshot stored under {key}")))
    }

    fn exists(&self, key: &str) -> bool {
        self.lock().map(|map| map.contains_key(key)).unwrap_or(false)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn locate(&self, key: &str) -> PathBuf {
        PathBuf::from(key)
    }
}
