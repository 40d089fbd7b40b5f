//! Shared test doubles for strategy and controller tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{GrafanaError, Result, SyncError};
use crate::grafana::GrafanaApi;
use crate::observe::{EventSink, EventType};
use crate::resources::{DesiredObject, ObjectKey, ResourceKind};
use crate::store::StatusWriter;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory Grafana double holding one id-to-spec table per kind.
///
/// Can be told to fail the next N upserts or deletes with a transient
/// error, to exercise the retry path.
#[derive(Debug, Default)]
pub struct FakeGrafana {
    objects: Mutex<HashMap<(ResourceKind, String), serde_json::Value>>,
    last_upsert_id: Mutex<HashMap<ResourceKind, Option<String>>>,
    deleted: Mutex<Vec<(ResourceKind, String)>>,
    next_id: AtomicU64,
    fail_upserts: AtomicU32,
    fail_deletes: AtomicU32,
}

impl FakeGrafana {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates Grafana with objects under the given ids.
    pub fn preset_ids(&self, kind: ResourceKind, ids: &[&str]) {
        let mut objects = lock(&self.objects);
        for id in ids {
            objects.insert((kind, (*id).to_string()), serde_json::Value::Null);
        }
    }

    /// Makes the next `n` upserts fail with a transient error.
    pub fn fail_next_upserts(&self, n: u32) {
        self.fail_upserts.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` deletes fail with a transient error.
    pub fn fail_next_deletes(&self, n: u32) {
        self.fail_deletes.store(n, Ordering::SeqCst);
    }

    /// Current ids for a kind.
    pub fn ids(&self, kind: ResourceKind) -> Vec<String> {
        lock(&self.objects)
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Ids deleted for a kind, in order.
    pub fn deleted_ids(&self, kind: ResourceKind) -> Vec<String> {
        lock(&self.deleted)
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// The previous-id argument of the most recent upsert for a kind.
    ///
    /// `None` means no upsert happened; `Some(None)` means an upsert with
    /// no previous id.
    pub fn last_upsert_id(&self, kind: ResourceKind) -> Option<Option<String>> {
        lock(&self.last_upsert_id).get(&kind).cloned()
    }

    fn transient() -> SyncError {
        SyncError::Grafana(GrafanaError::network("fake connection reset"))
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn upsert(
        &self,
        kind: ResourceKind,
        spec: &serde_json::Value,
        id: Option<&str>,
    ) -> Result<String> {
        lock(&self.last_upsert_id).insert(kind, id.map(String::from));

        if Self::take_failure(&self.fail_upserts) {
            return Err(Self::transient());
        }

        let id = id.map_or_else(
            || format!("fake-{}-{}", kind, self.next_id.fetch_add(1, Ordering::SeqCst)),
            String::from,
        );
        lock(&self.objects).insert((kind, id.clone()), spec.clone());
        Ok(id)
    }

    fn delete(&self, kind: ResourceKind, id: &str) -> Result<()> {
        if Self::take_failure(&self.fail_deletes) {
            return Err(Self::transient());
        }

        // Not-found deletes succeed, matching the real client.
        lock(&self.objects).remove(&(kind, id.to_string()));
        lock(&self.deleted).push((kind, id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl GrafanaApi for FakeGrafana {
    async fn post_dashboard(
        &self,
        spec: &serde_json::Value,
        id: Option<&str>,
    ) -> Result<String> {
        self.upsert(ResourceKind::Dashboard, spec, id)
    }

    async fn delete_dashboard(&self, id: &str) -> Result<()> {
        self.delete(ResourceKind::Dashboard, id)
    }

    async fn all_dashboard_ids(&self) -> Result<Vec<String>> {
        Ok(self.ids(ResourceKind::Dashboard))
    }

    async fn post_datasource(
        &self,
        spec: &serde_json::Value,
        id: Option<&str>,
    ) -> Result<String> {
        self.upsert(ResourceKind::DataSource, spec, id)
    }

    async fn delete_datasource(&self, id: &str) -> Result<()> {
        self.delete(ResourceKind::DataSource, id)
    }

    async fn all_datasource_ids(&self) -> Result<Vec<String>> {
        Ok(self.ids(ResourceKind::DataSource))
    }

    async fn post_folder(&self, spec: &serde_json::Value, id: Option<&str>) -> Result<String> {
        self.upsert(ResourceKind::Folder, spec, id)
    }

    async fn delete_folder(&self, id: &str) -> Result<()> {
        self.delete(ResourceKind::Folder, id)
    }

    async fn all_folder_ids(&self) -> Result<Vec<String>> {
        Ok(self.ids(ResourceKind::Folder))
    }

    async fn post_notification_channel(
        &self,
        spec: &serde_json::Value,
        id: Option<&str>,
    ) -> Result<String> {
        self.upsert(ResourceKind::AlertNotification, spec, id)
    }

    async fn delete_notification_channel(&self, id: &str) -> Result<()> {
        self.delete(ResourceKind::AlertNotification, id)
    }

    async fn all_notification_channel_ids(&self) -> Result<Vec<String>> {
        Ok(self.ids(ResourceKind::AlertNotification))
    }
}

/// Event sink capturing everything recorded against it.
#[derive(Debug, Default)]
pub struct CaptureSink {
    events: Mutex<Vec<(EventType, String)>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reasons recorded so far, in order.
    pub fn reasons(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .map(|(_, reason)| reason.clone())
            .collect()
    }
}

impl EventSink for CaptureSink {
    fn record(
        &self,
        _object: Option<&DesiredObject>,
        event_type: EventType,
        reason: &str,
        _message: &str,
    ) {
        lock(&self.events).push((event_type, reason.to_string()));
    }
}

/// Status writer that counts writes before delegating.
pub struct CountingWriter {
    inner: Arc<dyn StatusWriter>,
    writes: AtomicU32,
}

impl CountingWriter {
    pub fn new(inner: Arc<dyn StatusWriter>) -> Self {
        Self {
            inner,
            writes: AtomicU32::new(0),
        }
    }

    /// Number of writes that reached the underlying writer.
    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusWriter for CountingWriter {
    async fn update_status(&self, key: &ObjectKey, grafana_id: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update_status(key, grafana_id).await
    }
}
