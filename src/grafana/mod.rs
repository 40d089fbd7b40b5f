//! Grafana API surface.
//!
//! The reconciler talks to Grafana through the narrow [`GrafanaApi`]
//! trait: idempotent create-or-update, delete-by-id (404 is success), and
//! list-all-ids per resource kind. [`GrafanaClient`] is the reqwest-backed
//! production implementation.

mod client;
mod payload;

pub use client::GrafanaClient;
pub use payload::{field_string, sanitize, set_id};

use async_trait::async_trait;

use crate::error::Result;

/// Operations the reconciler needs from a Grafana server.
///
/// All upserts are idempotent: they receive the previously assigned id (if
/// any) so the implementation can update in place, and fall back to create
/// when the in-place update is rejected.
#[async_trait]
pub trait GrafanaApi: Send + Sync {
    /// Creates or updates a dashboard; returns its Grafana uid.
    async fn post_dashboard(
        &self,
        spec: &serde_json::Value,
        id: Option<&str>,
    ) -> Result<String>;

    /// Deletes a dashboard by uid. Already-gone is success.
    async fn delete_dashboard(&self, id: &str) -> Result<()>;

    /// Uids of all dashboards currently in Grafana.
    async fn all_dashboard_ids(&self) -> Result<Vec<String>>;

    /// Creates or updates a datasource; returns its Grafana id.
    async fn post_datasource(
        &self,
        spec: &serde_json::Value,
        id: Option<&str>,
    ) -> Result<String>;

    /// Deletes a datasource by id. Already-gone is success.
    async fn delete_datasource(&self, id: &str) -> Result<()>;

    /// Ids of all datasources currently in Grafana.
    async fn all_datasource_ids(&self) -> Result<Vec<String>>;

    /// Creates or updates a folder; returns its Grafana uid.
    async fn post_folder(&self, spec: &serde_json::Value, id: Option<&str>) -> Result<String>;

    /// Deletes a folder by uid. Already-gone is success.
    async fn delete_folder(&self, id: &str) -> Result<()>;

    /// Uids of all folders currently in Grafana.
    async fn all_folder_ids(&self) -> Result<Vec<String>>;

    /// Creates or updates a notification channel; returns its Grafana id.
    async fn post_notification_channel(
        &self,
        spec: &serde_json::Value,
        id: Option<&str>,
    ) -> Result<String>;

    /// Deletes a notification channel by id. Already-gone is success.
    async fn delete_notification_channel(&self, id: &str) -> Result<()>;

    /// Ids of all notification channels currently in Grafana.
    async fn all_notification_channel_ids(&self) -> Result<Vec<String>>;
}
