//! Durable storage of per-test records, keyed by test id.
//!
//! Saving the same test id twice overwrites; a store never holds duplicates.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::types::ExecutionRecord;

pub trait ResultStore: Send + Sync {
    fn save(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    /// All stored records in key order.
    fn load_all(&self) -> Result<Vec<ExecutionRecord>, StoreError>;
}

/// In-memory store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, ExecutionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, test_id: &str) -> Option<ExecutionRecord> {
        self.lock().get(test_id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ExecutionRecord>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ResultStore for MemoryStore {
    fn save(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        self.lock().insert(record.test_id.clone(), record.clone());
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<ExecutionRecord>, StoreError> {
        Ok(self.lock().values().cloned().collect())
    }
}

/// One JSON object on disk, `{ "<test id>": record, ... }`, rewritten on every save.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, ExecutionRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = fs::read_to_string(&self.path).map_err(|source| self.io_error(source))?;
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl ResultStore for JsonFileStore {
    fn save(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        let _held = self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut map = self.read_map()?;
        map.insert(record.test_id.clone(), record.clone());
        let json = serde_json::to_string_pretty(&map)?;
        fs::write(&self.path, json).map_err(|source| self.io_error(source))
    }

    fn load_all(&self) -> Result<Vec<ExecutionRecord>, StoreError> {
        let _held = self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(self.read_map()?.into_values().collect())
    }
}
