//! Sync strategy for dashboards.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::grafana::GrafanaApi;
use crate::queue::WorkItem;
use crate::resources::{DesiredObject, ObjectKey, ResourceKind};
use crate::store::{ObjectStore, StatusWriter, WatchEvent};

use super::{build_item, desired_ids, write_back, SyncStrategy};

/// Reconciles declared dashboards against Grafana.
pub struct DashboardSyncer {
    store: Arc<dyn ObjectStore>,
    status: Arc<dyn StatusWriter>,
    grafana: Arc<dyn GrafanaApi>,
}

impl DashboardSyncer {
    /// Creates a dashboard syncer with its dependencies injected.
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        status: Arc<dyn StatusWriter>,
        grafana: Arc<dyn GrafanaApi>,
    ) -> Self {
        Self {
            store,
            status,
            grafana,
        }
    }
}

#[async_trait]
impl SyncStrategy for DashboardSyncer {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Dashboard
    }

    fn build_work_item(&self, event: &WatchEvent) -> Option<WorkItem> {
        build_item(ResourceKind::Dashboard, event)
    }

    async fn read_by_key(&self, key: &ObjectKey) -> Result<Option<DesiredObject>> {
        self.store.get(key).await
    }

    async fn upsert_in_target(&self, object: &DesiredObject) -> Result<String> {
        self.grafana
            .post_dashboard(&object.spec, object.grafana_id())
            .await
    }

    async fn delete_in_target(&self, id: &str) -> Result<()> {
        self.grafana.delete_dashboard(id).await
    }

    async fn list_desired_ids(&self) -> Result<Vec<String>> {
        desired_ids(&self.store).await
    }

    async fn list_target_ids(&self) -> Result<Vec<String>> {
        self.grafana.all_dashboard_ids().await
    }

    async fn write_back_status(&self, object: &DesiredObject, id: &str) -> Result<()> {
        write_back(&self.status, object, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::sync::testutil::FakeGrafana;

    fn syncer(store: Arc<MemoryStore>, grafana: Arc<FakeGrafana>) -> DashboardSyncer {
        DashboardSyncer::new(store.clone(), store, grafana)
    }

    fn dashboard(name: &str, id: Option<&str>) -> DesiredObject {
        let mut obj = DesiredObject::new(
            ResourceKind::Dashboard,
            ObjectKey::new("default", name),
            serde_json::json!({ "title": name }),
        );
        obj.status.grafana_id = id.map(String::from);
        obj
    }

    #[tokio::test]
    async fn upsert_passes_the_previously_assigned_id() {
        let store = Arc::new(MemoryStore::new());
        let grafana = Arc::new(FakeGrafana::new());
        let syncer = syncer(store, Arc::clone(&grafana));

        let object = dashboard("main", Some("uid-1"));
        let id = syncer.upsert_in_target(&object).await.unwrap();

        assert_eq!(id, "uid-1");
        assert_eq!(
            grafana.last_upsert_id(ResourceKind::Dashboard),
            Some(Some("uid-1".into()))
        );
    }

    #[tokio::test]
    async fn upsert_twice_keeps_one_record_and_the_same_id() {
        let store = Arc::new(MemoryStore::new());
        let grafana = Arc::new(FakeGrafana::new());
        let syncer = syncer(store, Arc::clone(&grafana));

        let mut object = dashboard("main", None);
        let first = syncer.upsert_in_target(&object).await.unwrap();
        object.status.grafana_id = Some(first.clone());
        let second = syncer.upsert_in_target(&object).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(grafana.ids(ResourceKind::Dashboard).len(), 1);
    }

    #[tokio::test]
    async fn list_target_ids_reads_grafana_not_the_cache() {
        let store = Arc::new(MemoryStore::new());
        let grafana = Arc::new(FakeGrafana::new());
        grafana.preset_ids(ResourceKind::Dashboard, &["a", "b"]);

        let syncer = syncer(store, grafana);
        let mut ids = syncer.list_target_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
