//! Deduplicating, rate-limited work queue.
//!
//! Watch events and the resync timer enqueue [`WorkItem`]s; worker tasks
//! pull them off with [`WorkQueue::get`]. Items are deduplicated by their
//! [`ItemIdentity`] (variant plus object key), never by their payload, so
//! rapid updates to the same object coalesce into one pending entry.

mod backoff;
mod item;
mod work_queue;

pub use backoff::ItemBackoff;
pub use item::{ItemIdentity, WorkItem};
pub use work_queue::WorkQueue;
