//! # Snapshot Store
//!
//! Durable copy of the whole registry. The registry calls `save` after every
//! mutation and `load` once at startup.
//!
//! ## Key Features:
//! - **Atomic replacement**: `JsonFileStore` writes the full document to a
//!   sibling `.tmp` file, syncs it, and renames it over the live snapshot, so
//!   a crash mid-write leaves the previous snapshot intact.
//! - **Missing is empty**: no snapshot on disk loads as an empty registry.
//! - **Corrupt is an error**: a file that is not a valid document fails with
//!   [`StoreError::Corrupt`] instead of silently starting empty.

use crate::error::StoreError;
use crate::model::DeviceMap;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persistence seam of the registry.
pub trait SnapshotStore: Send + Sync {
    /// Reads the last saved snapshot, or an empty map if there is none.
    fn load(&self) -> Result<DeviceMap, StoreError>;

    /// Durably replaces the snapshot with `devices`. Returns only once the
    /// new snapshot is in place.
    fn save(&self, devices: &DeviceMap) -> Result<(), StoreError>;
}

/// # JSON File Store
///
/// Pretty-printed JSON document mapping device id to record.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_err(&self, path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Result<DeviceMap, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("No snapshot at {}, starting with an empty registry.", self.path.display());
                return Ok(DeviceMap::new());
            }
            Err(e) => return Err(self.io_err(&self.path, e)),
        };

        let devices: DeviceMap = serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        log::info!("Loaded {} device(s) from {}", devices.len(), self.path.display());
        Ok(devices)
    }

    fn save(&self, devices: &DeviceMap) -> Result<(), StoreError> {
        let tmp = self.temp_path();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(parent, e))?;
        }

        let file = File::create(&tmp).map_err(|e| self.io_err(&tmp, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, devices).map_err(StoreError::Encode)?;
        writer.flush().map_err(|e| self.io_err(&tmp, e))?;
        let file = writer.into_inner().map_err(|e| self.io_err(&tmp, e.into_error()))?;
        file.sync_all().map_err(|e| self.io_err(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(&self.path, e))?;
        log::trace!("Saved {} device(s) to {}", devices.len(), self.path.display());
        Ok(())
    }
}

/// # Memory Store
///
/// Keeps the last saved snapshot in memory. `set_failing(true)` makes every
/// subsequent `save` fail, which is how the registry's store-failure path is
/// exercised.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreState>,
}

#[derive(Debug, Default)]
struct MemoryStoreState {
    snapshot: DeviceMap,
    saves: usize,
    failing: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose first `load` returns `devices`.
    pub fn with_snapshot(devices: DeviceMap) -> Self {
        Self {
            inner: Mutex::new(MemoryStoreState {
                snapshot: devices,
                ..Default::default()
            }),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    /// The last successfully saved snapshot.
    pub fn saved(&self) -> DeviceMap {
        self.state().snapshot.clone()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.state().saves
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryStoreState> {
        // A panic while holding this lock cannot leave the state half-written.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> Result<DeviceMap, StoreError> {
        Ok(self.state().snapshot.clone())
    }

    fn save(&self, devices: &DeviceMap) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.failing {
            return Err(StoreError::Unavailable("memory store is in failing mode".to_string()));
        }
        state.snapshot = devices.clone();
        state.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceRecord, PowerState};

    fn sample() -> DeviceMap {
        let mut devices = DeviceMap::new();
        devices.insert(
            "lamp-1".to_string(),
            DeviceRecord {
                birth_date: "1931-05-12".to_string(),
                passing_date: "not-a-date".to_string(),
                last_state: PowerState::On,
                last_seen: Some(1_700_000_123),
            },
        );
        devices.insert(
            "lamp-2".to_string(),
            DeviceRecord::first_contact(PowerState::Reported("MANUAL_OFF".to_string()), 42),
        );
        devices
    }

    #[test]
    fn temp_file_sits_next_to_the_snapshot() {
        let store = JsonFileStore::new("state/devices.json");
        assert_eq!(store.path(), Path::new("state/devices.json"));
        assert_eq!(store.temp_path(), Path::new("state/devices.json.tmp"));
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("devices.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_reproduces_the_map() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("devices.json"));
        let devices = sample();

        store.save(&devices).unwrap();
        assert_eq!(store.load().unwrap(), devices);
        assert!(!dir.path().join("devices.json.tmp").exists());
    }

    #[test]
    fn save_replaces_the_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("devices.json"));
        store.save(&sample()).unwrap();

        let mut smaller = sample();
        smaller.remove("lamp-2");
        store.save(&smaller).unwrap();

        assert_eq!(store.load().unwrap(), smaller);
    }

    #[test]
    fn save_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state").join("devices.json"));
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn garbage_on_disk_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        fs::write(&path, b"{ this is not json").unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }), "got {err:?}");
    }

    #[test]
    fn leftover_temp_file_does_not_affect_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("devices.json"));
        store.save(&sample()).unwrap();
        fs::write(dir.path().join("devices.json.tmp"), b"{\"half").unwrap();

        assert_eq!(store.load().unwrap(), sample());
    }

    #[test]
    fn snapshot_is_indented_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        JsonFileStore::new(&path).save(&sample()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n  \"lamp-1\": {\n    \"birth_date\""), "{text}");
    }

    #[test]
    fn memory_store_failing_mode_keeps_last_good_snapshot() {
        let store = MemoryStore::new();
        store.save(&sample()).unwrap();
        store.set_failing(true);

        assert!(store.save(&DeviceMap::new()).is_err());
        assert_eq!(store.saved(), sample());
        assert_eq!(store.save_count(), 1);
    }
}
