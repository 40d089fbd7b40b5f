//! The reconcile control loop.
//!
//! One [`Controller`] runs per resource kind. It owns a [`WorkQueue`],
//! feeds it from watch events, and drives a pool of workers that dispatch
//! items through the kind's [`SyncStrategy`]. A periodic timer enqueues
//! drift-correction passes that remove Grafana objects no longer declared
//! anywhere.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::observe::{
    EventSink, EventType, SyncMetrics, MESSAGE_DELETED, MESSAGE_SYNCED, REASON_DELETED,
    REASON_SYNCED,
};
use crate::queue::{WorkItem, WorkQueue};
use crate::resources::DesiredObject;
use crate::store::{ObjectStore, WatchEvent};
use crate::sync::SyncStrategy;

/// How often the cache-sync gate is re-checked while waiting.
const CACHE_SYNC_POLL: Duration = Duration::from_millis(100);

/// Control loop for one resource kind.
pub struct Controller {
    strategy: Arc<dyn SyncStrategy>,
    cache: Arc<dyn ObjectStore>,
    queue: Arc<WorkQueue>,
    events: Arc<dyn EventSink>,
    metrics: Arc<SyncMetrics>,
}

impl Controller {
    /// Creates a controller around a strategy and its cache.
    #[must_use]
    pub fn new(
        strategy: Arc<dyn SyncStrategy>,
        cache: Arc<dyn ObjectStore>,
        events: Arc<dyn EventSink>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            strategy,
            cache,
            queue: Arc::new(WorkQueue::new()),
            events,
            metrics,
        }
    }

    /// Enqueues the work item derived from a watch event.
    ///
    /// Events whose payload is not of this controller's kind are dropped by
    /// the strategy.
    pub fn handle_event(&self, event: &WatchEvent) {
        if let Some(item) = self.strategy.build_work_item(event) {
            self.queue.add_rate_limited(item);
        }
    }

    /// Runs the control loop until `shutdown` flips to true.
    ///
    /// Waits for the cache's initial listing before starting `workers`
    /// worker tasks. A non-zero `resync_interval` also starts the periodic
    /// drift-correction timer. On shutdown the queue stops handing out
    /// items, in-flight items finish, and all tasks are joined.
    pub async fn run(
        self: &Arc<Self>,
        workers: usize,
        resync_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let kind = self.strategy.kind();

        if !self.wait_for_cache(&mut shutdown).await {
            info!(%kind, "Shutdown requested before cache sync completed");
            self.queue.shut_down();
            return;
        }

        info!(%kind, workers, "Starting workers");
        let mut tasks = JoinSet::new();
        for worker in 0..workers {
            let controller = Arc::clone(self);
            tasks.spawn(async move {
                debug!(kind = %controller.strategy.kind(), worker, "Worker started");
                while let Some(item) = controller.queue.get().await {
                    controller.process(item).await;
                }
                debug!(kind = %controller.strategy.kind(), worker, "Worker stopped");
            });
        }

        if !resync_interval.is_zero() {
            let controller = Arc::clone(self);
            let mut resync_shutdown = shutdown.clone();
            tasks.spawn(async move {
                let mut ticker = tokio::time::interval(resync_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // The first tick fires immediately; the initial listing
                // already covers that ground.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => controller.queue.add_rate_limited(WorkItem::Resync),
                        changed = resync_shutdown.changed() => {
                            if changed.is_err() || *resync_shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        info!(%kind, "Shutting down");
        self.queue.shut_down();
        while tasks.join_next().await.is_some() {}
        info!(%kind, "All workers stopped");
    }

    /// Blocks until the cache reports synced; false if shutdown came first.
    async fn wait_for_cache(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        while !self.cache.has_synced() {
            tokio::select! {
                () = tokio::time::sleep(CACHE_SYNC_POLL) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Processes one item and settles its queue bookkeeping.
    ///
    /// Success forgets the item's backoff. A fatal error is logged and
    /// dropped, since retrying cannot fix it. Everything else is re-queued
    /// with backoff.
    async fn process(&self, item: WorkItem) {
        let result = self.dispatch(&item).await;
        self.queue.done(&item);

        match result {
            Ok(()) => self.queue.forget(&item),
            Err(err) if err.is_fatal() => {
                error!(item = %item.identity(), %err, "Dropping item after unrecoverable error");
                self.metrics.inc_errors();
                self.queue.forget(&item);
            }
            Err(err) => {
                warn!(item = %item.identity(), %err, "Reconcile failed, requeuing");
                self.metrics.inc_errors();
                self.queue.requeue_rate_limited(item);
            }
        }
    }

    async fn dispatch(&self, item: &WorkItem) -> Result<()> {
        match item {
            WorkItem::Upsert {
                key,
                snapshot,
                external_id,
            } => match self.strategy.read_by_key(key).await? {
                Some(object) => {
                    let id = self.strategy.upsert_in_target(&object).await?;
                    self.strategy.write_back_status(&object, &id).await?;
                    self.events
                        .record(Some(&object), EventType::Normal, REASON_SYNCED, MESSAGE_SYNCED);
                    self.metrics.inc_synced(self.strategy.kind());
                    Ok(())
                }
                // Vanished between enqueue and processing: clean up with
                // the id captured at enqueue time.
                None => self.delete_captured(snapshot, external_id.as_deref()).await,
            },
            WorkItem::Delete {
                snapshot,
                external_id,
                ..
            } => self.delete_captured(snapshot, external_id.as_deref()).await,
            WorkItem::Resync => self.resync_deleted_objects().await,
        }
    }

    /// Deletes the Grafana object behind a vanished declared object.
    ///
    /// An object that never got an id assigned has nothing in Grafana to
    /// delete, so that case is immediate success.
    async fn delete_captured(
        &self,
        snapshot: &DesiredObject,
        external_id: Option<&str>,
    ) -> Result<()> {
        let Some(id) = external_id else {
            debug!(key = %snapshot.key, "Object vanished before an id was assigned, nothing to delete");
            return Ok(());
        };

        self.strategy.delete_in_target(id).await?;
        self.events
            .record(Some(snapshot), EventType::Normal, REASON_DELETED, MESSAGE_DELETED);
        self.metrics.inc_deleted(self.strategy.kind());
        Ok(())
    }

    /// Removes Grafana objects of this kind that no declared object claims.
    ///
    /// The declared side is enumerated first and the whole pass aborts if
    /// any object lacks an assigned id, so a half-initialized set can never
    /// make live objects look orphaned. Deletion stops at the first
    /// failure; the pass is re-queued and the next attempt covers whatever
    /// remains.
    async fn resync_deleted_objects(&self) -> Result<()> {
        let kind = self.strategy.kind();
        self.metrics.inc_resync(kind);

        let desired: HashSet<String> = self.strategy.list_desired_ids().await?.into_iter().collect();
        let live = self.strategy.list_target_ids().await?;

        for id in live {
            if desired.contains(&id) {
                continue;
            }
            debug!(%kind, %id, "Deleting orphaned Grafana object");
            self.strategy.delete_in_target(&id).await?;
            self.metrics.inc_deleted(kind);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{DesiredObject, ObjectKey, ResourceKind};
    use crate::store::MemoryStore;
    use crate::sync::testutil::{CaptureSink, CountingWriter, FakeGrafana};
    use crate::sync::DashboardSyncer;

    struct Fixture {
        controller: Arc<Controller>,
        store: Arc<MemoryStore>,
        grafana: Arc<FakeGrafana>,
        events: Arc<CaptureSink>,
        metrics: Arc<SyncMetrics>,
        writer: Arc<CountingWriter>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let grafana = Arc::new(FakeGrafana::new());
        let events = Arc::new(CaptureSink::new());
        let metrics = Arc::new(SyncMetrics::new());
        let writer = Arc::new(CountingWriter::new(Arc::clone(&store) as _));

        let strategy = DashboardSyncer::new(
            Arc::clone(&store) as _,
            Arc::clone(&writer) as _,
            Arc::clone(&grafana) as _,
        );
        let controller = Arc::new(Controller::new(
            Arc::new(strategy),
            Arc::clone(&store) as _,
            Arc::clone(&events) as _,
            Arc::clone(&metrics),
        ));

        Fixture {
            controller,
            store,
            grafana,
            events,
            metrics,
            writer,
        }
    }

    fn dashboard(name: &str, id: Option<&str>) -> DesiredObject {
        let mut obj = DesiredObject::new(
            ResourceKind::Dashboard,
            ObjectKey::new("default", name),
            serde_json::json!({ "title": name }),
        );
        obj.status.grafana_id = id.map(String::from);
        obj
    }

    /// Pulls one item off the queue and processes it.
    async fn turn(fx: &Fixture) {
        let item = fx.controller.queue.get().await.unwrap();
        fx.controller.process(item).await;
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_retries_then_writes_status_once() {
        let fx = fixture();
        let event = fx.store.insert(dashboard("main", None));
        fx.grafana.fail_next_upserts(1);

        fx.controller.handle_event(&event);
        turn(&fx).await; // fails, requeued with backoff
        turn(&fx).await; // succeeds

        assert_eq!(fx.writer.writes(), 1);
        assert_eq!(fx.events.reasons(), vec!["Synced"]);
        assert_eq!(fx.metrics.synced(ResourceKind::Dashboard), 1);
        assert_eq!(fx.metrics.errors(), 1);

        let key = ObjectKey::new("default", "main");
        let stored = fx.store.get(&key).await.unwrap().unwrap();
        assert!(stored.grafana_id().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn reprocessing_an_unchanged_object_writes_status_once() {
        let fx = fixture();
        let event = fx.store.insert(dashboard("main", None));

        fx.controller.handle_event(&event);
        turn(&fx).await;
        fx.controller.handle_event(&event);
        turn(&fx).await;

        assert_eq!(fx.grafana.ids(ResourceKind::Dashboard).len(), 1);
        assert_eq!(fx.writer.writes(), 1);
        assert_eq!(fx.metrics.synced(ResourceKind::Dashboard), 2);
        assert_eq!(fx.metrics.errors(), 0);
    }

    #[tokio::test]
    async fn vanished_object_is_deleted_with_the_captured_id() {
        let fx = fixture();
        fx.grafana.preset_ids(ResourceKind::Dashboard, &["uid-9"]);

        // Enqueued as an upsert, but the object is gone by processing time.
        let item = WorkItem::Upsert {
            key: ObjectKey::new("default", "main"),
            snapshot: dashboard("main", Some("uid-9")),
            external_id: Some("uid-9".into()),
        };
        fx.controller.process(item).await;

        assert_eq!(fx.grafana.deleted_ids(ResourceKind::Dashboard), vec!["uid-9"]);
        assert_eq!(fx.events.reasons(), vec!["Deleted"]);
        assert_eq!(fx.metrics.deleted(ResourceKind::Dashboard), 1);
    }

    #[tokio::test]
    async fn delete_without_an_assigned_id_succeeds_without_calling_grafana() {
        let fx = fixture();

        let item = WorkItem::Delete {
            key: ObjectKey::new("default", "main"),
            snapshot: dashboard("main", None),
            external_id: None,
        };
        fx.controller.process(item).await;

        assert!(fx.grafana.deleted_ids(ResourceKind::Dashboard).is_empty());
        assert_eq!(fx.metrics.errors(), 0);
        assert!(fx.events.reasons().is_empty());
    }

    #[tokio::test]
    async fn resync_deletes_only_undeclared_objects() {
        let fx = fixture();
        fx.store.insert(dashboard("a", Some("A")));
        fx.store.insert(dashboard("c", Some("C")));
        fx.grafana.preset_ids(ResourceKind::Dashboard, &["A", "B", "C"]);

        fx.controller.process(WorkItem::Resync).await;

        assert_eq!(fx.grafana.deleted_ids(ResourceKind::Dashboard), vec!["B"]);
        let mut remaining = fx.grafana.ids(ResourceKind::Dashboard);
        remaining.sort();
        assert_eq!(remaining, vec!["A", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn resync_aborts_before_deleting_when_an_id_is_uninitialized() {
        let fx = fixture();
        fx.store.insert(dashboard("ready", Some("A")));
        fx.store.insert(dashboard("fresh", None));
        fx.grafana.preset_ids(ResourceKind::Dashboard, &["A", "B"]);

        fx.controller.process(WorkItem::Resync).await;

        assert!(fx.grafana.deleted_ids(ResourceKind::Dashboard).is_empty());
        assert_eq!(fx.metrics.errors(), 1);

        // The pass is retried, not dropped.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fx.controller.queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resync_stops_at_the_first_delete_failure() {
        let fx = fixture();
        fx.grafana.preset_ids(ResourceKind::Dashboard, &["B", "D"]);
        fx.grafana.fail_next_deletes(1);
        fx.store.mark_synced();

        fx.controller.process(WorkItem::Resync).await;

        assert!(fx.grafana.deleted_ids(ResourceKind::Dashboard).is_empty());
        assert_eq!(fx.metrics.errors(), 1);

        // The retried pass finishes the job.
        tokio::time::sleep(Duration::from_secs(1)).await;
        turn(&fx).await;
        assert_eq!(fx.grafana.deleted_ids(ResourceKind::Dashboard).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_processes_events_and_stops_on_shutdown() {
        let fx = fixture();
        fx.store.mark_synced();
        let event = fx.store.insert(dashboard("main", None));
        fx.controller.handle_event(&event);

        let (tx, rx) = watch::channel(false);
        let controller = Arc::clone(&fx.controller);
        let runner = tokio::spawn(async move {
            controller.run(2, Duration::ZERO, rx).await;
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        tx.send(true).unwrap();
        runner.await.unwrap();

        assert_eq!(fx.metrics.synced(ResourceKind::Dashboard), 1);
        let key = ObjectKey::new("default", "main");
        let stored = fx.store.get(&key).await.unwrap().unwrap();
        assert!(stored.grafana_id().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn resync_timer_removes_orphans_while_running() {
        let fx = fixture();
        fx.store.mark_synced();
        fx.store.insert(dashboard("a", Some("A")));
        fx.grafana.preset_ids(ResourceKind::Dashboard, &["A", "orphan"]);

        let (tx, rx) = watch::channel(false);
        let controller = Arc::clone(&fx.controller);
        let runner = tokio::spawn(async move {
            controller.run(1, Duration::from_secs(1), rx).await;
        });

        tokio::time::sleep(Duration::from_millis(2500)).await;
        tx.send(true).unwrap();
        runner.await.unwrap();

        assert_eq!(fx.grafana.deleted_ids(ResourceKind::Dashboard), vec!["orphan"]);
        assert!(fx.metrics.snapshot().resyncs >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_waits_for_the_cache_before_processing() {
        let fx = fixture();
        let event = fx.store.insert(dashboard("main", None));
        fx.controller.handle_event(&event);

        let (tx, rx) = watch::channel(false);
        let controller = Arc::clone(&fx.controller);
        let runner = tokio::spawn(async move {
            controller.run(1, Duration::ZERO, rx).await;
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fx.metrics.synced(ResourceKind::Dashboard), 0);

        fx.store.mark_synced();
        tokio::time::sleep(Duration::from_millis(500)).await;
        tx.send(true).unwrap();
        runner.await.unwrap();

        assert_eq!(fx.metrics.synced(ResourceKind::Dashboard), 1);
    }
}
