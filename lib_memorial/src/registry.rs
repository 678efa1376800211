//! # Device Registry
//!
//! The single authoritative map of known devices. The ingestion listener, the
//! calendar scheduler and the HTTP façade all go through the same mutex, and
//! every public operation holds it for its full duration, store save
//! included.
//!
//! ## Commit Rule
//! A mutation is applied to a staged copy of the map, the staged copy is
//! saved, and only then is it swapped in. If the save fails the in-memory map
//! is untouched and the caller gets the [`StoreError`](crate::StoreError), so
//! memory never runs ahead of disk.
//!
//! Saves run on tokio's blocking pool while the lock stays held, so file I/O
//! never stalls the worker threads serving other tasks.
//!
//! `tokio::sync::Mutex` queues waiters fairly, so operations complete in the
//! order they asked for the lock.

use crate::error::{RegistryError, StoreError};
use crate::model::{DeviceMap, DeviceRecord, PowerState};
use crate::store::SnapshotStore;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task;

pub struct Registry {
    devices: Mutex<DeviceMap>,
    store: Arc<dyn SnapshotStore>,
}

impl Registry {
    /// Loads the last snapshot from `store` and wraps it.
    pub fn open(store: Arc<dyn SnapshotStore>) -> Result<Self, RegistryError> {
        let devices = store.load()?;
        Ok(Self {
            devices: Mutex::new(devices),
            store,
        })
    }

    /// Creates the record on first contact, otherwise updates `last_state`
    /// and `last_seen` in place.
    pub async fn upsert(&self, id: &str, state: PowerState, seen_at: u64) -> Result<(), RegistryError> {
        let mut devices = self.devices.lock().await;
        let mut staged = devices.clone();

        match staged.get_mut(id) {
            Some(record) => {
                record.last_state = state;
                record.last_seen = Some(seen_at);
            }
            None => {
                log::info!("New device '{}' reported state {}", id, state);
                staged.insert(id.to_string(), DeviceRecord::first_contact(state, seen_at));
            }
        }

        self.commit(&mut devices, staged).await
    }

    /// Updates whichever dates are `Some`. Fails with `UnknownDevice` when `id`
    /// is not registered.
    pub async fn set_dates(
        &self,
        id: &str,
        birth_date: Option<String>,
        passing_date: Option<String>,
    ) -> Result<(), RegistryError> {
        let mut devices = self.devices.lock().await;
        let mut staged = devices.clone();

        let record = staged
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownDevice(id.to_string()))?;
        if let Some(birth) = birth_date {
            record.birth_date = birth;
        }
        if let Some(passing) = passing_date {
            record.passing_date = passing;
        }

        self.commit(&mut devices, staged).await
    }

    /// Sets `last_state` if the device is known. Returns `false` (and touches
    /// nothing) when it is not.
    pub async fn set_state(&self, id: &str, state: PowerState) -> Result<bool, RegistryError> {
        let mut devices = self.devices.lock().await;
        if !devices.contains_key(id) {
            return Ok(false);
        }

        let mut staged = devices.clone();
        if let Some(record) = staged.get_mut(id) {
            record.last_state = state;
        }
        self.commit(&mut devices, staged).await?;
        Ok(true)
    }

    /// Consistent copy of the whole registry.
    pub async fn snapshot(&self) -> DeviceMap {
        self.devices.lock().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<DeviceRecord> {
        self.devices.lock().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.devices.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.lock().await.is_empty()
    }

    /// Visits every record under one lock acquisition.
    ///
    /// `visit` gets each record by mutable reference and returns whether it
    /// changed it. All changes are saved once, at the end of the pass, before
    /// the lock is released. Returns the number of changed records.
    pub async fn for_each_mut<F>(&self, mut visit: F) -> Result<usize, RegistryError>
    where
        F: FnMut(&str, &mut DeviceRecord) -> bool,
    {
        let mut devices = self.devices.lock().await;
        let mut staged = devices.clone();

        let mut changed = 0;
        for (id, record) in staged.iter_mut() {
            if visit(id.as_str(), record) {
                changed += 1;
            }
        }

        if changed > 0 {
            self.commit(&mut devices, staged).await?;
        }
        Ok(changed)
    }

    /// Saves `staged` on the blocking pool, then swaps it into `live`. The
    /// caller keeps holding the lock across the await.
    async fn commit(&self, live: &mut DeviceMap, staged: DeviceMap) -> Result<(), RegistryError> {
        let store = Arc::clone(&self.store);
        let saved = task::spawn_blocking(move || store.save(&staged).map(|()| staged))
            .await
            .unwrap_or_else(|e| Err(StoreError::Unavailable(format!("save task failed: {e}"))));

        match saved {
            Ok(staged) => {
                *live = staged;
                Ok(())
            }
            Err(e) => {
                log::error!("Store save failed, mutation discarded: {}", e);
                Err(e.into())
            }
        }
    }
}
