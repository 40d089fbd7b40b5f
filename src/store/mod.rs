//! Desired-state store interfaces.
//!
//! The reconciler consumes the desired-state store through two narrow
//! traits: [`ObjectStore`] for point reads and listing (a local cache,
//! read-only from the reconciler's perspective) and [`StatusWriter`] for
//! the status write-back path. Watch notifications arrive as
//! [`WatchEvent`]s and feed the controller's enqueue path.

mod manifest;
mod memory;

pub use manifest::{diff_events, ManifestLoader};
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::resources::{DesiredObject, ObjectKey};

/// A change notification from the desired-state store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// An object appeared.
    Added(DesiredObject),
    /// An object's spec changed.
    Updated(DesiredObject),
    /// An object was removed; carries the last-known object.
    Deleted(DesiredObject),
}

impl WatchEvent {
    /// The object this event refers to.
    #[must_use]
    pub const fn object(&self) -> &DesiredObject {
        match self {
            Self::Added(obj) | Self::Updated(obj) | Self::Deleted(obj) => obj,
        }
    }
}

/// Read access to the locally cached desired state.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Point read by identity. `Ok(None)` means the object is not declared.
    async fn get(&self, key: &ObjectKey) -> Result<Option<DesiredObject>>;

    /// All currently declared objects.
    async fn list(&self) -> Result<Vec<DesiredObject>>;

    /// Whether the initial full listing has completed.
    ///
    /// Workers must not start before this reports true, or they would
    /// reconcile against a partially populated view.
    fn has_synced(&self) -> bool;
}

/// Write path for persisting an assigned Grafana id onto an object's
/// status.
///
/// Implementations operate on their own copy; the reconciler never mutates
/// cached objects in place.
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Records `grafana_id` on the object's status.
    async fn update_status(&self, key: &ObjectKey, grafana_id: &str) -> Result<()>;
}
