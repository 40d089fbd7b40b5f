// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Grafana Sync
//!
//! A declarative reconciliation controller that keeps a Grafana server in
//! sync with objects declared in manifest files.
//!
//! ## Overview
//!
//! Grafana Sync provides a Kubernetes-like controller experience for
//! Grafana dashboards, datasources, folders, and notification channels,
//! allowing you to:
//!
//! - Declare Grafana objects as YAML or JSON manifests
//! - Continuously reconcile the declared state into a Grafana server
//! - Automatically remove Grafana objects that are no longer declared
//! - Absorb transient API failures with per-object exponential backoff
//!
//! ## Architecture
//!
//! The system is built around the concept of **desired state reconciliation**:
//!
//! 1. **Desired State**: Declared objects loaded from a manifest directory
//! 2. **Observed State**: Queried live from the Grafana REST API
//! 3. **Controllers**: One per kind, each driving a deduplicating work
//!    queue and a pool of reconcile workers
//!
//! ## Modules
//!
//! - [`resources`]: Declared object model and identities
//! - [`store`]: Desired-state store, manifest loading, and watch events
//! - [`queue`]: Deduplicating, rate-limited work queue
//! - [`sync`]: Per-kind synchronization strategies
//! - [`controller`]: The reconcile control loop and drift correction
//! - [`grafana`]: Grafana REST API client
//! - [`observe`]: Reconcile events and controller metrics
//! - [`error`]: Error hierarchy
//!
//! ## Example
//!
//! ```yaml
//! kind: Dashboard
//! metadata:
//!   name: service-overview
//!   namespace: platform
//! spec:
//!   title: Service Overview
//!   panels: []
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod controller;
pub mod error;
pub mod grafana;
pub mod observe;
pub mod queue;
pub mod resources;
pub mod store;
pub mod sync;

// ============================================================================
// Re-exports
// ============================================================================

pub use controller::Controller;
pub use error::{GrafanaError, ManifestError, Result, StoreError, SyncError};
pub use grafana::{GrafanaApi, GrafanaClient};
pub use observe::{EventSink, EventType, LogEventSink, MetricsSnapshot, SyncMetrics};
pub use queue::{ItemBackoff, ItemIdentity, WorkItem, WorkQueue};
pub use resources::{DesiredObject, ObjectKey, ObjectStatus, ResourceKind};
pub use store::{
    diff_events, ManifestLoader, MemoryStore, ObjectStore, StatusWriter, WatchEvent,
};
pub use sync::{
    DashboardSyncer, DataSourceSyncer, FolderSyncer, NotificationChannelSyncer, SyncStrategy,
};
