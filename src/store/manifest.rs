//! Manifest loading for the desired-state store.
//!
//! Declared objects are read from YAML or JSON manifest files in a
//! directory, each declaring a `kind`, `metadata` identity and an opaque
//! `spec`. Re-listing the directory and diffing against the cache gives
//! the daemon a watch source without any external dependency.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ManifestError, Result, SyncError};
use crate::resources::{DesiredObject, ObjectKey, ResourceKind};

use super::WatchEvent;

/// One manifest document.
#[derive(Debug, Deserialize)]
struct ManifestDoc {
    kind: ResourceKind,
    metadata: ManifestMeta,
    spec: serde_json::Value,
}

/// Identity block of a manifest document.
#[derive(Debug, Deserialize)]
struct ManifestMeta {
    name: String,
    #[serde(default = "default_namespace")]
    namespace: String,
}

fn default_namespace() -> String {
    String::from("default")
}

/// Loads declared objects from a directory of manifest files.
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    dir: PathBuf,
}

impl ManifestLoader {
    /// Creates a loader for the given directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Loads every declared object from the directory.
    ///
    /// Files ending in `.yaml`, `.yml`, or `.json` are parsed; YAML files
    /// may contain multiple documents. Two documents declaring the same
    /// `(kind, namespace, name)` are an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing, a file cannot be
    /// parsed, or a duplicate object is declared.
    pub fn load(&self) -> Result<Vec<DesiredObject>> {
        if !self.dir.is_dir() {
            return Err(SyncError::Manifest(ManifestError::DirectoryNotFound {
                path: self.dir.clone(),
            }));
        }

        info!("Loading manifests from: {}", self.dir.display());

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml" | "yml" | "json")
                )
            })
            .collect();
        paths.sort();

        let mut objects: HashMap<(ResourceKind, ObjectKey), DesiredObject> = HashMap::new();

        for path in paths {
            for object in Self::parse_file(&path)? {
                let slot = (object.kind, object.key.clone());
                if objects.contains_key(&slot) {
                    return Err(SyncError::Manifest(ManifestError::DuplicateObject {
                        key: format!("{} {}", object.kind, object.key),
                    }));
                }
                objects.insert(slot, object);
            }
        }

        debug!("Loaded {} declared objects", objects.len());
        Ok(objects.into_values().collect())
    }

    /// Parses all documents in one manifest file.
    fn parse_file(path: &Path) -> Result<Vec<DesiredObject>> {
        debug!("Parsing manifest file: {}", path.display());
        let content = std::fs::read_to_string(path)?;

        let location = Some(path.display().to_string());
        let mut parsed = Vec::new();

        for document in serde_yaml::Deserializer::from_str(&content) {
            let doc = ManifestDoc::deserialize(document).map_err(|e| {
                SyncError::Manifest(ManifestError::parse(e.to_string(), location.clone()))
            })?;

            parsed.push(DesiredObject::new(
                doc.kind,
                ObjectKey::new(doc.metadata.namespace, doc.metadata.name),
                doc.spec,
            ));
        }

        Ok(parsed)
    }
}

/// Diffs freshly loaded objects against the current cache contents and
/// returns the watch events that bring the cache up to date.
///
/// Status is carried over from the cached object so an update never drops
/// an already assigned Grafana id. Objects whose spec is unchanged produce
/// no event, keeping steady-state rescans quiet.
#[must_use]
pub fn diff_events(current: &[DesiredObject], loaded: Vec<DesiredObject>) -> Vec<WatchEvent> {
    let mut existing: HashMap<ObjectKey, &DesiredObject> =
        current.iter().map(|obj| (obj.key.clone(), obj)).collect();

    let mut events = Vec::new();

    for mut object in loaded {
        match existing.remove(&object.key) {
            None => events.push(WatchEvent::Added(object)),
            Some(previous) => {
                if previous.spec != object.spec {
                    object.status = previous.status.clone();
                    events.push(WatchEvent::Updated(object));
                }
            }
        }
    }

    // Whatever remains was declared before but is gone from the manifests.
    for (_, object) in existing {
        events.push(WatchEvent::Deleted(object.clone()));
    }

    events
}
