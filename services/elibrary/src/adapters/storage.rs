//! services/elibrary/src/adapters/storage.rs
//!
//! Concrete implementations of the `KeyValueStorage` port: an in-memory map
//! for tests and demos, and a JSON file on disk for the real client.

use elibrary_core::ports::{KeyValueStorage, PortError, PortResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

const STORAGE_FILE: &str = "storage.json";

//=========================================================================================
// In-Memory Backend
//=========================================================================================

/// In-memory storage backend. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> PortResult<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PortResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PortResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> PortResult<Vec<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.keys().cloned().collect())
    }
}

//=========================================================================================
// File Backend
//=========================================================================================

/// Storage persisted as a single JSON object in `<dir>/storage.json`.
///
/// The whole map is cached in memory and rewritten on every mutation.
/// Writes go to a temporary file that is then renamed over the original,
/// so a crash never leaves a half-written file behind.
pub struct FileStorage {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Opens (or creates) the storage file inside `dir`.
    pub fn open(dir: impl AsRef<Path>) -> PortResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| {
            PortError::Storage(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let path = dir.join(STORAGE_FILE);
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| PortError::Storage(format!("cannot read {}: {}", path.display(), e)))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| {
                    PortError::Storage(format!("corrupt storage file {}: {}", path.display(), e))
                })?
            }
        } else {
            BTreeMap::new()
        };
        debug!("Opened storage at {} with {} keys", path.display(), entries.len());

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> PortResult<()> {
        let data = serde_json::to_string_pretty(entries)
            .map_err(|e| PortError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| PortError::Storage(format!("cannot write {}: {}", self.path.display(), e)))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> PortResult<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PortResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> PortResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn keys(&self) -> PortResult<Vec<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.keys().cloned().collect())
    }
}
