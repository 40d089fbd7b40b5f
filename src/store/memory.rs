//! In-memory desired-state store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{Result, StoreError, SyncError};
use crate::resources::{DesiredObject, ObjectKey};

use super::{ObjectStore, StatusWriter, WatchEvent};

/// RwLock-backed store holding the declared objects of one resource kind.
///
/// Serves as both the local cache and, in this repository's manifest-driven
/// wiring, the authoritative store that status write-back lands in. The
/// feeder calls [`apply`] for every watch event and [`mark_synced`] once
/// the initial listing is complete.
///
/// [`apply`]: MemoryStore::apply
/// [`mark_synced`]: MemoryStore::mark_synced
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<ObjectKey, DesiredObject>>,
    synced: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty, not-yet-synced store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the initial full listing as complete.
    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::SeqCst);
    }

    /// Applies a watch event to the cache.
    ///
    /// Status is reconciler-owned: an id assigned to the stored object
    /// (possibly by a write-back racing the event's construction) is kept
    /// even when the incoming object carries none.
    pub fn apply(&self, event: &WatchEvent) {
        let mut objects = self
            .objects
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match event {
            WatchEvent::Added(obj) | WatchEvent::Updated(obj) => {
                let mut incoming = obj.clone();
                if incoming.status.grafana_id.is_none() {
                    if let Some(existing) = objects.get(&incoming.key) {
                        incoming.status = existing.status.clone();
                    }
                }
                objects.insert(incoming.key.clone(), incoming);
            }
            WatchEvent::Deleted(obj) => {
                objects.remove(&obj.key);
            }
        }
    }

    /// Inserts an object directly, returning the event it corresponds to.
    pub fn insert(&self, object: DesiredObject) -> WatchEvent {
        let mut objects = self
            .objects
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let existed = objects.insert(object.key.clone(), object.clone()).is_some();
        if existed {
            WatchEvent::Updated(object)
        } else {
            WatchEvent::Added(object)
        }
    }

    /// Removes an object, returning the deletion event if it was present.
    pub fn remove(&self, key: &ObjectKey) -> Option<WatchEvent> {
        let mut objects = self
            .objects
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        objects.remove(key).map(WatchEvent::Deleted)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<DesiredObject>> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(objects.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<DesiredObject>> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(objects.values().cloned().collect())
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusWriter for MemoryStore {
    async fn update_status(&self, key: &ObjectKey, grafana_id: &str) -> Result<()> {
        let mut objects = self
            .objects
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(object) = objects.get_mut(key) else {
            return Err(SyncError::Store(StoreError::StatusWriteFailed {
                key: key.to_string(),
                message: String::from("object no longer present"),
            }));
        };

        object.status.grafana_id = Some(grafana_id.to_string());
        Ok(())
    }
}
