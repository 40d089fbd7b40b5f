//! The deduplicating, rate-limited work queue.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Semaphore;
use tracing::debug;

use super::backoff::ItemBackoff;
use super::item::{ItemIdentity, WorkItem};

/// Queue bookkeeping, guarded by one mutex.
///
/// Mirrors the classic controller workqueue: `order` holds queued
/// identities in FIFO order, `dirty` marks identities awaiting processing,
/// and `processing` marks identities currently held by a worker. An item
/// re-added while in flight stays dirty and is re-queued on `done`.
#[derive(Debug, Default)]
struct QueueState {
    order: VecDeque<ItemIdentity>,
    payloads: HashMap<ItemIdentity, WorkItem>,
    dirty: HashSet<ItemIdentity>,
    processing: HashSet<ItemIdentity>,
    shutting_down: bool,
}

/// A deduplicating, rate-limited, async-blocking queue of [`WorkItem`]s.
///
/// Guarantees at most one in-flight processing per item identity and
/// coalesces equal-identity items enqueued while one is already pending,
/// keeping the newest payload. Safe for concurrent use from any number of
/// tasks.
#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    // One permit per entry in `order`; closing it makes pending and future
    // `get` calls return immediately during shutdown.
    ready: Semaphore,
    backoff: Mutex<ItemBackoff>,
}

impl WorkQueue {
    /// Creates an empty queue with the default backoff limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backoff(ItemBackoff::new())
    }

    /// Creates an empty queue with a custom backoff policy.
    #[must_use]
    pub fn with_backoff(backoff: ItemBackoff) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            ready: Semaphore::new(0),
            backoff: Mutex::new(backoff),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_backoff(&self) -> MutexGuard<'_, ItemBackoff> {
        self.backoff.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts an item unconditionally (subject to dedup and shutdown).
    ///
    /// If an equal-identity item is already pending, only the payload is
    /// refreshed; no second entry is queued. If the identity is currently
    /// in flight, the item is re-queued once the worker calls [`done`].
    ///
    /// [`done`]: WorkQueue::done
    pub fn add(&self, item: WorkItem) {
        self.enqueue(item, true);
    }

    fn enqueue(&self, item: WorkItem, refresh_payload: bool) {
        let identity = item.identity();
        let mut state = self.lock_state();

        if state.shutting_down {
            debug!(item = %identity, "Dropping item enqueued during shutdown");
            return;
        }

        // Latest payload always wins when a fresh event coalesces; a
        // requeued failure must not replace a newer pending payload.
        if refresh_payload || !state.dirty.contains(&identity) {
            state.payloads.insert(identity.clone(), item);
        }

        if state.dirty.contains(&identity) {
            return;
        }
        state.dirty.insert(identity.clone());

        if !state.processing.contains(&identity) {
            state.order.push_back(identity);
            drop(state);
            self.ready.add_permits(1);
        }
    }

    /// Inserts an item after the backoff delay computed from its
    /// consecutive failures.
    ///
    /// The delay grows exponentially per identity and is capped; a
    /// zero-failure identity is enqueued after the base delay.
    pub fn add_rate_limited(self: &Arc<Self>, item: WorkItem) {
        self.delayed(item, true);
    }

    /// Re-enqueues a failed item after its backoff delay, keeping any
    /// newer payload that arrived for the same identity in the meantime.
    pub fn requeue_rate_limited(self: &Arc<Self>, item: WorkItem) {
        self.delayed(item, false);
    }

    fn delayed(self: &Arc<Self>, item: WorkItem, refresh_payload: bool) {
        let delay = self.lock_backoff().next_delay(&item.identity());

        if delay.is_zero() {
            self.enqueue(item, refresh_payload);
            return;
        }

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.enqueue(item, refresh_payload);
        });
    }

    /// Waits until an item is available and returns it, or returns `None`
    /// once the queue is shutting down.
    ///
    /// The caller must pass the item to [`done`] after processing it.
    ///
    /// [`done`]: WorkQueue::done
    pub async fn get(&self) -> Option<WorkItem> {
        let Ok(permit) = self.ready.acquire().await else {
            // Closed: shutting down, unblock immediately.
            return None;
        };
        permit.forget();

        let mut state = self.lock_state();
        let identity = state.order.pop_front()?;
        state.dirty.remove(&identity);
        state.processing.insert(identity.clone());
        state.payloads.remove(&identity)
    }

    /// Marks processing of the item complete.
    ///
    /// If an equal-identity item arrived while this one was in flight, it
    /// is queued now.
    pub fn done(&self, item: &WorkItem) {
        let identity = item.identity();
        let mut state = self.lock_state();
        state.processing.remove(&identity);

        if state.dirty.contains(&identity) && !state.shutting_down {
            state.order.push_back(identity);
            drop(state);
            self.ready.add_permits(1);
        }
    }

    /// Resets the failure counter for the item, so its next failure starts
    /// from the base delay again.
    pub fn forget(&self, item: &WorkItem) {
        self.lock_backoff().forget(&item.identity());
    }

    /// Stops accepting new items and unblocks all pending [`get`] calls.
    ///
    /// In-flight items may still be passed to [`done`]; they are not
    /// re-queued afterwards.
    ///
    /// [`get`]: WorkQueue::get
    /// [`done`]: WorkQueue::done
    pub fn shut_down(&self) {
        self.lock_state().shutting_down = true;
        self.ready.close();
    }

    /// Returns true once [`shut_down`] has been called.
    ///
    /// [`shut_down`]: WorkQueue::shut_down
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.lock_state().shutting_down
    }

    /// Number of items currently queued (excluding in-flight items).
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_state().order.len()
    }

    /// Returns true if no items are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
