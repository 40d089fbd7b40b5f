//! Sync strategy for datasources.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::grafana::GrafanaApi;
use crate::queue::WorkItem;
use crate::resources::{DesiredObject, ObjectKey, ResourceKind};
use crate::store::{ObjectStore, StatusWriter, WatchEvent};

use super::{build_item, desired_ids, write_back, SyncStrategy};

/// Reconciles declared datasources against Grafana.
pub struct DataSourceSyncer {
    store: Arc<dyn ObjectStore>,
    status: Arc<dyn StatusWriter>,
    grafana: Arc<dyn GrafanaApi>,
}

impl DataSourceSyncer {
    /// Creates a datasource syncer with its dependencies injected.
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
impl SyncStrategy for DataSourceSyncer {
    fn kind(&self) -> ResourceKind {
        ResourceKind::DataSource
    }

    fn build_work_item(&self, event: &WatchEvent) -> Option<WorkItem> {
        build_item(ResourceKind::DataSource, event)
    }

    async fn read_by_key(&self, key: &ObjectKey) -> Result<Option<DesiredObject>> {
        self.store.get(key).await
    }

    async fn upsert_in_target(&self, object: &DesiredObject) -> Result<String> {
        self.grafana
            .post_datasource(&object.spec, object.grafana_id())
            .await
    }

    async fn delete_in_target(&self, id: &str) -> Result<()> {
        self.grafana.delete_datasource(id).await
    }

    async fn list_desired_ids(&self) -> Result<Vec<String>> {
        desired_ids(&self.store).await
    }

    async fn list_target_ids(&self) -> Result<Vec<String>> {
        self.grafana.all_datasource_ids().await
    }

    async fn write_back_status(&self, object: &DesiredObject, id: &str) -> Result<()> {
        write_back(&self.status, object, id).await
    }
}
