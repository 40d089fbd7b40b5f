//! Observability: reconcile events and controller metrics.
//!
//! Event recording is best-effort and must never fail or block the
//! reconcile path. Metric handles live in a [`SyncMetrics`] struct owned
//! by whoever constructs the controllers; nothing is registered through
//! process-wide state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use crate::resources::{DesiredObject, KIND_COUNT, ResourceKind};

/// Event reason for a successful sync.
pub const REASON_SYNCED: &str = "Synced";
/// Event message for a successful sync.
pub const MESSAGE_SYNCED: &str = "Grafana object synced successfully";

/// Event reason for a successful deletion.
pub const REASON_DELETED: &str = "Deleted";
/// Event message for a successful deletion.
pub const MESSAGE_DELETED: &str = "Grafana object deleted successfully";

/// Severity of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Routine state transition.
    Normal,
    /// Something needing attention.
    Warning,
}

/// Best-effort sink for reconcile events.
pub trait EventSink: Send + Sync {
    /// Records an event against an object (or against nothing, for
    /// controller-level events).
    fn record(
        &self,
        object: Option<&DesiredObject>,
        event_type: EventType,
        reason: &str,
        message: &str,
    );
}

/// Event sink that emits events as structured log lines.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    /// Creates a log-backed event sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn record(
        &self,
        object: Option<&DesiredObject>,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) {
        let target = object.map_or_else(String::new, |obj| format!("{} {}", obj.kind, obj.key));
        match event_type {
            EventType::Normal => info!(%reason, object = %target, "{message}"),
            EventType::Warning => warn!(%reason, object = %target, "{message}"),
        }
    }
}

/// HTTP verb of a Grafana API call, for latency accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVerb {
    /// Create calls.
    Post,
    /// In-place update calls.
    Put,
    /// List/read calls.
    Get,
    /// Delete calls.
    Delete,
}

const VERB_COUNT: usize = 4;

impl ApiVerb {
    const fn index(self) -> usize {
        match self {
            Self::Post => 0,
            Self::Put => 1,
            Self::Get => 2,
            Self::Delete => 3,
        }
    }

    /// Verb label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Put => "put",
            Self::Get => "get",
            Self::Delete => "delete",
        }
    }
}

/// Per-kind counter set.
#[derive(Debug, Default)]
struct KindCounters([AtomicU64; KIND_COUNT]);

impl KindCounters {
    fn inc(&self, kind: ResourceKind) {
        self.0[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self, kind: ResourceKind) -> u64 {
        self.0[kind.index()].load(Ordering::Relaxed)
    }

    fn total(&self) -> u64 {
        self.0.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }
}

/// Counters and latency accumulators for the controllers and the Grafana
/// client.
///
/// Constructed once and shared by `Arc`; handles are injected rather than
/// registered globally.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    synced: KindCounters,
    deleted: KindCounters,
    resyncs: KindCounters,
    wasted_puts: KindCounters,
    errors: AtomicU64,
    call_nanos: [AtomicU64; VERB_COUNT],
    call_count: [AtomicU64; VERB_COUNT],
}

impl SyncMetrics {
    /// Creates a zeroed metrics set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a successfully synced object.
    pub fn inc_synced(&self, kind: ResourceKind) {
        self.synced.inc(kind);
    }

    /// Counts a successfully deleted object.
    pub fn inc_deleted(&self, kind: ResourceKind) {
        self.deleted.inc(kind);
    }

    /// Counts a drift-correction pass.
    pub fn inc_resync(&self, kind: ResourceKind) {
        self.resyncs.inc(kind);
    }

    /// Counts an in-place update that had to fall back to create.
    pub fn inc_wasted_put(&self, kind: ResourceKind) {
        self.wasted_puts.inc(kind);
    }

    /// Counts a reconcile error.
    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the latency of one Grafana API call.
    pub fn observe_call(&self, verb: ApiVerb, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.call_nanos[verb.index()].fetch_add(nanos, Ordering::Relaxed);
        self.call_count[verb.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Number of synced objects for a kind.
    #[must_use]
    pub fn synced(&self, kind: ResourceKind) -> u64 {
        self.synced.get(kind)
    }

    /// Number of deleted objects for a kind.
    #[must_use]
    pub fn deleted(&self, kind: ResourceKind) -> u64 {
        self.deleted.get(kind)
    }

    /// Number of wasted puts for a kind.
    #[must_use]
    pub fn wasted_puts(&self, kind: ResourceKind) -> u64 {
        self.wasted_puts.get(kind)
    }

    /// Total reconcile errors.
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Point-in-time totals, for logging.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            synced: self.synced.total(),
            deleted: self.deleted.total(),
            resyncs: self.resyncs.total(),
            wasted_puts: self.wasted_puts.total(),
            errors: self.errors(),
            mean_call_latency: self.mean_latency(),
        }
    }

    fn mean_latency(&self) -> Option<Duration> {
        let total_nanos: u64 = self
            .call_nanos
            .iter()
            .map(|n| n.load(Ordering::Relaxed))
            .sum();
        let total_count: u64 = self
            .call_count
            .iter()
            .map(|n| n.load(Ordering::Relaxed))
            .sum();
        if total_count == 0 {
            return None;
        }
        Some(Duration::from_nanos(total_nanos / total_count))
    }
}

/// Point-in-time metric totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Total synced objects across kinds.
    pub synced: u64,
    /// Total deleted objects across kinds.
    pub deleted: u64,
    /// Total drift-correction passes.
    pub resyncs: u64,
    /// Total puts that fell back to create.
    pub wasted_puts: u64,
    /// Total reconcile errors.
    pub errors: u64,
    /// Mean Grafana call latency, if any calls were made.
    pub mean_call_latency: Option<Duration>,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "synced={} deleted={} resyncs={} wasted_puts={} errors={}",
            self.synced, self.deleted, self.resyncs, self.wasted_puts, self.errors
        )?;
        if let Some(latency) = self.mean_call_latency {
            write!(f, " mean_call_latency={latency:?}")?;
        }
        Ok(())
    }
}
