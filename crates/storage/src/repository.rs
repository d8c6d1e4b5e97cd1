//! Record Store Implementations

use crate::StorageError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Persisted odometer reconciliation state
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OdometerState {
    /// Offset added to the adapter's distance-since-reset
    pub base_offset: f64,
    /// Last accepted distance-since-reset reading
    pub last_distance_since_reset: f64,
    /// Set once a user reading has been applied
    pub initialized: bool,
}

impl OdometerState {
    /// Reported odometer, once initialized
    pub fn total(&self) -> Option<f64> {
        self.initialized
            .then(|| self.base_offset + self.last_distance_since_reset)
    }
}

/// Load/save of the persisted records.
///
/// Writes are synchronous: when a save returns `Ok`, the next load observes it.
pub trait RecordStore: Send + Sync {
    /// Load the odometer state; a missing record is the default state
    fn load_odometer_state(&self) -> Result<OdometerState, StorageError>;

    fn save_odometer_state(&self, state: &OdometerState) -> Result<(), StorageError>;

    /// Load the tank volume in liters, if one was ever saved
    fn load_tank_volume(&self) -> Result<Option<f64>, StorageError>;

    fn save_tank_volume(&self, liters: f64) -> Result<(), StorageError>;
}

impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    fn load_odometer_state(&self) -> Result<OdometerState, StorageError> {
        (**self).load_odometer_state()
    }

    fn save_odometer_state(&self, state: &OdometerState) -> Result<(), StorageError> {
        (**self).save_odometer_state(state)
    }

    fn load_tank_volume(&self) -> Result<Option<f64>, StorageError> {
        (**self).load_tank_volume()
    }

    fn save_tank_volume(&self, liters: f64) -> Result<(), StorageError> {
        (**self).save_tank_volume(liters)
    }
}

/// Everything a store holds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Records {
    #[serde(default)]
    odometer: Option<OdometerState>,
    #[serde(default)]
    tank_volume_liters: Option<f64>,
}

/// In-memory store, with switchable write failures for tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following save fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Records>, StorageError> {
        self.records
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("Lock error: {}", e)))
    }

    fn write(&self, apply: impl FnOnce(&mut Records)) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        apply(&mut *self.lock()?);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn load_odometer_state(&self) -> Result<OdometerState, StorageError> {
        Ok(self.lock()?.odometer.unwrap_or_default())
    }

    fn save_odometer_state(&self, state: &OdometerState) -> Result<(), StorageError> {
        self.write(|records| records.odometer = Some(*state))
    }

    fn load_tank_volume(&self) -> Result<Option<f64>, StorageError> {
        Ok(self.lock()?.tank_volume_liters)
    }

    fn save_tank_volume(&self, liters: f64) -> Result<(), StorageError> {
        self.write(|records| records.tank_volume_liters = Some(liters))
    }
}

/// Store backed by a single JSON file.
///
/// Saves write a sibling temp file and rename it over the original.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileStore {
    /// Use `path`; the file is created on first save
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!("Using state file {}", path.display());
        Self {
            path,
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, err: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.display().to_string(),
            message: err.to_string(),
        }
    }

    fn read(&self) -> Result<Records, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| StorageError::SerializationError(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Records::default()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut Records)) -> Result<(), StorageError> {
        let _guard = self
            .guard
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("Lock error: {}", e)))?;

        let mut records = self.read()?;
        apply(&mut records);

        let content = serde_json::to_string_pretty(&records)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        debug!("Saved records to {}", self.path.display());
        Ok(())
    }
}

impl RecordStore for JsonFileStore {
    fn load_odometer_state(&self) -> Result<OdometerState, StorageError> {
        Ok(self.read()?.odometer.unwrap_or_default())
    }

    fn save_odometer_state(&self, state: &OdometerState) -> Result<(), StorageError> {
        self.update(|records| records.odometer = Some(*state))
    }

    fn load_tank_volume(&self) -> Result<Option<f64>, StorageError> {
        Ok(self.read()?.tank_volume_liters)
    }

    fn save_tank_volume(&self, liters: f64) -> Result<(), StorageError> {
        self.update(|records| records.tank_volume_liters = Some(liters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("storage-test-{}-{}", std::process::id(), name))
            .join("state.json")
    }

    #[test]
    fn test_memory_defaults() {
        let store = MemoryStore::new();
        let state = store.load_odometer_state().unwrap();
        assert!(!state.initialized);
        assert_eq!(state.total(), None);
        assert_eq!(store.load_tank_volume().unwrap(), None);
    }

    #[test]
    fn test_memory_save_and_load() {
        let store = MemoryStore::new();
        let state = OdometerState {
            base_offset: 11_000.0,
            last_distance_since_reset: 4000.0,
            initialized: true,
        };
        store.save_odometer_state(&state).unwrap();
        store.save_tank_volume(45.0).unwrap();

        assert_eq!(store.load_odometer_state().unwrap(), state);
        assert_eq!(store.load_odometer_state().unwrap().total(), Some(15_000.0));
        assert_eq!(store.load_tank_volume().unwrap(), Some(45.0));
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_memory_write_failure() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(store.save_tank_volume(45.0).is_err());
        assert_eq!(store.load_tank_volume().unwrap(), None);
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_json_store_survives_reopen() {
        let path = temp_path("reopen");
        let _ = std::fs::remove_file(&path);

        let store = JsonFileStore::new(&path);
        assert_eq!(store.load_odometer_state().unwrap(), OdometerState::default());

        let state = OdometerState {
            base_offset: 100.0,
            last_distance_since_reset: 50.0,
            initialized: true,
        };
        store.save_odometer_state(&state).unwrap();
        store.save_tank_volume(60.0).unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.load_odometer_state().unwrap(), state);
        assert_eq!(reopened.load_tank_volume().unwrap(), Some(60.0));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let path = temp_path("garbage");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.load_odometer_state(),
            Err(StorageError::SerializationError(_))
        ));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
