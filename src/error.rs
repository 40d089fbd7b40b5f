//! Error types for the Grafana sync controller.
//!
//! This module provides the error hierarchy for all operations in the
//! reconciliation lifecycle: manifest loading, the desired-state store,
//! the Grafana API, and the control loop itself.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Grafana sync controller.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Grafana API errors.
    #[error("Grafana API error: {0}")]
    Grafana(#[from] GrafanaError),

    /// Desired-state store errors.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Manifest loading errors.
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Grafana API errors.
#[derive(Debug, Error)]
pub enum GrafanaError {
    /// API request failed with an HTTP error status.
    #[error("Grafana API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Rate limited by the server.
    #[error("Grafana API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Object not found in Grafana.
    #[error("Grafana object not found: {id}")]
    NotFound {
        /// Identifier of the missing object.
        id: String,
    },

    /// The server rejected an in-place update.
    #[error("Grafana rejected update of {id}: {message}")]
    Conflict {
        /// Identifier the update was attempted against.
        id: String,
        /// Error message from the API.
        message: String,
    },

    /// Network error.
    #[error("Network error communicating with Grafana: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the API.
    #[error("Invalid response from Grafana API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// The declared spec cannot be sent to Grafana as-is.
    ///
    /// Retrying cannot fix a malformed document; the object is only
    /// reconsidered once its manifest changes.
    #[error("Invalid object payload: {message}")]
    InvalidPayload {
        /// Description of the payload issue.
        message: String,
    },
}

/// Desired-state store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An object was enumerated before it was ever assigned a Grafana id.
    ///
    /// Drift correction must abort on this rather than match orphans
    /// against an empty id.
    #[error("Object {key} has an uninitialized Grafana id")]
    UninitializedId {
        /// Identity of the uninitialized object.
        key: String,
    },

    /// Writing the Grafana id back onto the object's status failed.
    #[error("Failed to write status for {key}: {message}")]
    StatusWriteFailed {
        /// Identity of the object.
        key: String,
        /// Description of the failure.
        message: String,
    },
}

/// Manifest loading errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest directory was not found.
    #[error("Manifest directory not found: {path}")]
    DirectoryNotFound {
        /// Path to the missing directory.
        path: PathBuf,
    },

    /// A manifest file could not be parsed.
    #[error("Failed to parse manifest: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Two manifests declare the same object.
    #[error("Duplicate object declared in manifests: {key}")]
    DuplicateObject {
        /// The duplicated identity.
        key: String,
    },
}

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is transient and worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Grafana(
                GrafanaError::RateLimited { .. }
                    | GrafanaError::NetworkError { .. }
                    | GrafanaError::ApiRequestFailed { status: 500.., .. }
            )
        )
    }

    /// Returns true if this error is a contract violation that retrying
    /// cannot fix.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Grafana(GrafanaError::InvalidPayload { .. }) | Self::Internal(_)
        )
    }
}

impl GrafanaError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Creates an invalid-payload error.
    #[must_use]
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }
}

impl ManifestError {
    /// Creates a parse error with an optional source location.
    #[must_use]
    pub fn parse(message: impl Into<String>, location: Option<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location,
        }
    }
}
