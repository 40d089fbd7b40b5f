//! Work item model.

use crate::resources::{DesiredObject, ObjectKey};

/// One unit of reconciliation work.
///
/// The snapshot is a best-effort copy of the object at enqueue time: by the
/// time the item is processed the object may already be gone from the
/// store, and the snapshot is what deletion events are reported against.
/// The captured Grafana id is what gets deleted from Grafana once the
/// declared object has vanished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// Create or update the object in Grafana.
    Upsert {
        /// Object identity.
        key: ObjectKey,
        /// Copy of the object at enqueue time.
        snapshot: DesiredObject,
        /// Grafana id recorded at enqueue time, if any.
        external_id: Option<String>,
    },
    /// Remove the object from Grafana.
    Delete {
        /// Object identity.
        key: ObjectKey,
        /// Copy of the object at enqueue time.
        snapshot: DesiredObject,
        /// Grafana id recorded at enqueue time, if any.
        external_id: Option<String>,
    },
    /// Run the periodic drift-correction pass.
    ///
    /// Carries no key, snapshot, or id; it is distinguished by this
    /// variant alone, never by empty fields.
    Resync,
}

/// Dedup identity of a work item.
///
/// Deliberately excludes the snapshot and captured id: repeated updates to
/// the same object must collapse into one queue entry even though their
/// snapshots differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemIdentity {
    /// Pending upsert for one object.
    Upsert(ObjectKey),
    /// Pending delete for one object.
    Delete(ObjectKey),
    /// Pending drift-correction pass.
    Resync,
}

impl WorkItem {
    /// Returns this item's dedup identity.
    #[must_use]
    pub fn identity(&self) -> ItemIdentity {
        match self {
            Self::Upsert { key, .. } => ItemIdentity::Upsert(key.clone()),
            Self::Delete { key, .. } => ItemIdentity::Delete(key.clone()),
            Self::Resync => ItemIdentity::Resync,
        }
    }

    /// Returns the object key, if this item targets one object.
    #[must_use]
    pub const fn key(&self) -> Option<&ObjectKey> {
        match self {
            Self::Upsert { key, .. } | Self::Delete { key, .. } => Some(key),
            Self::Resync => None,
        }
    }
}

impl std::fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upsert(key) => write!(f, "upsert {key}"),
            Self::Delete(key) => write!(f, "delete {key}"),
            Self::Resync => write!(f, "resync"),
        }
    }
}
