//! Grafana HTTP client implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{header, Client, Method, Response, StatusCode};
use tracing::{debug, warn};

use crate::error::{GrafanaError, Result, SyncError};
use crate::observe::{ApiVerb, SyncMetrics};
use crate::resources::ResourceKind;

use super::payload::{field_string, sanitize, set_id};
use super::GrafanaApi;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Fallback retry-after when the server rate limits without a header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Grafana REST API client.
#[derive(Debug, Clone)]
pub struct GrafanaClient {
    /// HTTP client.
    client: Client,
    /// Base URL of the Grafana server, without a trailing slash.
    base_url: String,
    /// Optional API key sent as a bearer token.
    api_key: Option<String>,
    /// Injected metric handles for call latency and wasted puts.
    metrics: Arc<SyncMetrics>,
}

impl GrafanaClient {
    /// Creates a new Grafana client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        metrics: Arc<SyncMetrics>,
    ) -> Result<Self> {
        Self::with_timeout(base_url, api_key, metrics, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(
        base_url: &str,
        api_key: Option<String>,
        metrics: Arc<SyncMetrics>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GrafanaError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            metrics,
        })
    }

    /// Executes one request, recording its latency under the given verb.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        verb: ApiVerb,
    ) -> Result<Response> {
        let url = format!("{}{path}", self.base_url);
        debug!(verb = verb.as_str(), %url, "Grafana API call");

        let mut request = self
            .client
            .request(method, &url)
            .header(header::CONTENT_TYPE, "application/json");

        if let Some(key) = &self.api_key {
            request = request.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            self.metrics.observe_call(verb, started.elapsed());
            GrafanaError::network(format!("Request failed: {e}"))
        })?;
        self.metrics.observe_call(verb, started.elapsed());

        Ok(response)
    }

    /// Maps a non-success response to the error taxonomy.
    async fn error_for(response: Response) -> SyncError {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return SyncError::Grafana(GrafanaError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let body = response.text().await.unwrap_or_default();
        SyncError::Grafana(GrafanaError::api_error(status.as_u16(), body))
    }

    /// POSTs an object and returns the parsed response body.
    async fn post_object(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let response = self.execute(Method::POST, path, Some(body), ApiVerb::Post).await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }
        Self::parse_body(response).await
    }

    /// PUTs an object and returns the parsed response body.
    async fn put_object(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let response = self.execute(Method::PUT, path, Some(body), ApiVerb::Put).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // An update rejected for identity reasons is surfaced as a
            // conflict so the caller can fall back to create.
            if matches!(
                status,
                StatusCode::NOT_FOUND | StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED
            ) {
                return Err(SyncError::Grafana(GrafanaError::Conflict {
                    id: path.to_string(),
                    message: body,
                }));
            }
            return Err(SyncError::Grafana(GrafanaError::api_error(
                status.as_u16(),
                body,
            )));
        }
        Self::parse_body(response).await
    }

    /// DELETEs a path; a 404 counts as success.
    async fn delete_object(&self, path: &str) -> Result<()> {
        let response = self.execute(Method::DELETE, path, None, ApiVerb::Delete).await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(Self::error_for(response).await)
    }

    /// GETs a path and returns the parsed response body.
    async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let response = self.execute(Method::GET, path, None, ApiVerb::Get).await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }
        Self::parse_body(response).await
    }

    async fn parse_body(response: Response) -> Result<serde_json::Value> {
        response.json().await.map_err(|e| {
            SyncError::Grafana(GrafanaError::invalid_response(format!(
                "Failed to parse response: {e}"
            )))
        })
    }

    /// Update-in-place with create fallback, shared by datasources,
    /// folders, and notification channels.
    ///
    /// Only a conflict (the server rejecting the update for identity
    /// reasons) is retried as a create; transient failures surface to the
    /// caller so the queue's backoff handles them.
    async fn put_or_post(
        &self,
        kind: ResourceKind,
        body: &serde_json::Value,
        put_path: &str,
        post_path: &str,
    ) -> Result<serde_json::Value> {
        match self.put_object(put_path, body).await {
            Ok(response) => Ok(response),
            Err(err) if matches!(err, SyncError::Grafana(GrafanaError::Conflict { .. })) => {
                warn!(%err, path = put_path, "In-place update rejected, retrying as create");
                self.metrics.inc_wasted_put(kind);
                self.post_object(post_path, body).await
            }
            Err(err) => Err(err),
        }
    }

    fn expect_array(value: serde_json::Value, what: &str) -> Result<Vec<serde_json::Value>> {
        match value {
            serde_json::Value::Array(items) => Ok(items),
            _ => Err(SyncError::Grafana(GrafanaError::invalid_response(format!(
                "expected an array of {what}"
            )))),
        }
    }
}

#[async_trait]
impl GrafanaApi for GrafanaClient {
    async fn post_dashboard(
        &self,
        spec: &serde_json::Value,
        id: Option<&str>,
    ) -> Result<String> {
        let mut dashboard = sanitize(spec, false)?;
        if let Some(id) = id {
            set_id(&mut dashboard, "uid", id)?;
        }

        // The dashboard endpoint upserts on its own given overwrite; no
        // put-or-post dance needed.
        let body = serde_json::json!({
            "dashboard": dashboard,
            "folderId": 0,
            "overwrite": true,
        });

        let response = self.post_object("/api/dashboards/db", &body).await?;
        field_string(&response, "uid")
    }

    async fn delete_dashboard(&self, id: &str) -> Result<()> {
        self.delete_object(&format!("/api/dashboards/uid/{id}")).await
    }

    async fn all_dashboard_ids(&self) -> Result<Vec<String>> {
        let response = self.get_json("/api/search").await?;
        let entries = Self::expect_array(response, "dashboards")?;

        let mut ids = Vec::new();
        for entry in entries {
            // Folders show up in the search API alongside dashboards; skip
            // them or drift correction would delete folders as orphans.
            if entry.get("type").and_then(|t| t.as_str()) == Some("dash-folder") {
                continue;
            }
            ids.push(field_string(&entry, "uid")?);
        }
        Ok(ids)
    }

    async fn post_datasource(
        &self,
        spec: &serde_json::Value,
        id: Option<&str>,
    ) -> Result<String> {
        let body = sanitize(spec, false)?;

        let response = match id {
            None => self.post_object("/api/datasources", &body).await?,
            Some(id) => {
                self.put_or_post(
                    ResourceKind::DataSource,
                    &body,
                    &format!("/api/datasources/{id}"),
                    "/api/datasources",
                )
                .await?
            }
        };
        field_string(&response, "id")
    }

    async fn delete_datasource(&self, id: &str) -> Result<()> {
        self.delete_object(&format!("/api/datasources/{id}")).await
    }

    async fn all_datasource_ids(&self) -> Result<Vec<String>> {
        let response = self.get_json("/api/datasources").await?;
        let entries = Self::expect_array(response, "datasources")?;

        entries
            .iter()
            .map(|entry| field_string(entry, "id"))
            .collect()
    }

    async fn post_folder(&self, spec: &serde_json::Value, id: Option<&str>) -> Result<String> {
        // Folders require overwrite to ignore version checks.
        let body = sanitize(spec, true)?;

        let response = match id {
            None => self.post_object("/api/folders", &body).await?,
            Some(id) => {
                self.put_or_post(
                    ResourceKind::Folder,
                    &body,
                    &format!("/api/folders/{id}"),
                    "/api/folders",
                )
                .await?
            }
        };
        field_string(&response, "uid")
    }

    async fn delete_folder(&self, id: &str) -> Result<()> {
        self.delete_object(&format!("/api/folders/{id}")).await
    }

    async fn all_folder_ids(&self) -> Result<Vec<String>> {
        let response = self.get_json("/api/folders").await?;
        let entries = Self::expect_array(response, "folders")?;

        entries
            .iter()
            .map(|entry| field_string(entry, "uid"))
            .collect()
    }

    async fn post_notification_channel(
        &self,
        spec: &serde_json::Value,
        id: Option<&str>,
    ) -> Result<String> {
        let body = sanitize(spec, false)?;

        let response = match id {
            None => self.post_object("/api/alert-notifications", &body).await?,
            Some(id) => {
                self.put_or_post(
                    ResourceKind::AlertNotification,
                    &body,
                    &format!("/api/alert-notifications/{id}"),
                    "/api/alert-notifications",
                )
                .await?
            }
        };
        field_string(&response, "id")
    }

    async fn delete_notification_channel(&self, id: &str) -> Result<()> {
        self.delete_object(&format!("/api/alert-notifications/{id}"))
            .await
    }

    async fn all_notification_channel_ids(&self) -> Result<Vec<String>> {
        let response = self.get_json("/api/alert-notifications").await?;
        let entries = Self::expect_array(response, "notification channels")?;

        entries
            .iter()
            .map(|entry| field_string(entry, "id"))
            .collect()
    }
}
