//! Resource model for declared Grafana objects.
//!
//! The reconciler treats object payloads as opaque JSON documents; only
//! identity, kind, and the assigned Grafana id have meaning here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The resource kinds this controller reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A Grafana dashboard.
    Dashboard,
    /// A Grafana datasource.
    DataSource,
    /// A Grafana folder.
    Folder,
    /// A Grafana alert notification channel.
    AlertNotification,
}

/// Number of resource kinds, for per-kind metric arrays.
pub const KIND_COUNT: usize = 4;

impl ResourceKind {
    /// All kinds, in a stable order.
    pub const ALL: [Self; KIND_COUNT] = [
        Self::Dashboard,
        Self::DataSource,
        Self::Folder,
        Self::AlertNotification,
    ];

    /// Label used in logs, events, and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::DataSource => "datasource",
            Self::Folder => "folder",
            Self::AlertNotification => "alert-notification",
        }
    }

    /// Stable index for per-kind metric arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Dashboard => 0,
            Self::DataSource => 1,
            Self::Folder => 2,
            Self::AlertNotification => 3,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a declared object, unique within the desired-state store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Namespace the object belongs to.
    pub namespace: String,
    /// Object name, unique within its namespace.
    pub name: String,
}

impl ObjectKey {
    /// Creates a key from namespace and name.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Status block of a declared object.
///
/// The Grafana id starts out unassigned and is written back by the
/// reconciler after the first successful upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStatus {
    /// Identifier assigned by Grafana, `None` until the object has been
    /// created there.
    pub grafana_id: Option<String>,
}

/// A declared desired-state object.
///
/// Owned by the desired-state store; the reconciler reads it and writes
/// only its status, never the spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredObject {
    /// Object identity.
    pub key: ObjectKey,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Opaque spec payload forwarded to Grafana.
    pub spec: serde_json::Value,
    /// Reconciler-owned status.
    #[serde(default)]
    pub status: ObjectStatus,
}

impl DesiredObject {
    /// Creates a new object with an unassigned Grafana id.
    #[must_use]
    pub fn new(kind: ResourceKind, key: ObjectKey, spec: serde_json::Value) -> Self {
        Self {
            key,
            kind,
            spec,
            status: ObjectStatus::default(),
        }
    }

    /// Returns the assigned Grafana id, if any.
    #[must_use]
    pub fn grafana_id(&self) -> Option<&str> {
        self.status.grafana_id.as_deref()
    }
}
