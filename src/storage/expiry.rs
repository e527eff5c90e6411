//! Expiration Scheduling and the Background Sweeper
//!
//! Every TTL-bearing SET pushes one item onto the store's [`ExpiryQueue`], a
//! min-heap ordered by deadline. Due items are removed in two ways:
//!
//! 1. **Lazy**: every foreground operation first purges the items whose
//!    deadline has passed, under the same lock it then works with.
//! 2. **Active**: an [`ExpirySweeper`] task sleeps until the earliest deadline
//!    and purges without waiting for traffic.
//!
//! An item only deletes its key if the key still holds the entry the item was
//! scheduled for (same [`EntryId`]). A key that was deleted and set again is
//! left alone by the stale item.

use super::entry::EntryId;
use super::store::Store;
use super::Engine;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, trace};

struct Scheduled<K> {
    deadline: Instant,
    seq: u64,
    key: K,
    id: EntryId,
}

impl<K> PartialEq for Scheduled<K> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<K> Eq for Scheduled<K> {}

impl<K> PartialOrd for Scheduled<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Scheduled<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the BinaryHeap pops the earliest deadline first.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pending expirations, earliest deadline first.
pub struct ExpiryQueue<K> {
    heap: BinaryHeap<Scheduled<K>>,
    seq: u64,
}

impl<K> Default for ExpiryQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> ExpiryQueue<K> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    /// Schedules removal of entry `id` under `key` at `deadline`.
    pub fn schedule(&mut self, deadline: Instant, key: K, id: EntryId) {
        self.heap.push(Scheduled {
            deadline,
            seq: self.seq,
            key,
            id,
        });
        self.seq = self.seq.wrapping_add(1);
    }

    /// The earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|item| item.deadline)
    }

    /// Pops the earliest item if its deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<(K, EntryId)> {
        if self.heap.peek()?.deadline > now {
            return None;
        }
        self.heap.pop().map(|item| (item.key, item.id))
    }

    /// Keeps only the items for which `keep(key, id)` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, EntryId) -> bool) {
        self.heap.retain(|item| keep(&item.key, item.id));
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Longest sleep between passes, used when nothing is scheduled (default: 1s)
    pub idle_interval: Duration,

    /// Shortest sleep between passes (default: 1ms)
    pub min_interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(1),
            min_interval: Duration::from_millis(1),
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime. The sweeper stops when the
    /// returned handle is dropped.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use twinkv::storage::{ExpiryConfig, ExpirySweeper, OrderedStore};
    ///
    /// let store: OrderedStore<String, String> = OrderedStore::ordered();
    /// let sweeper = ExpirySweeper::start(store.clone(), ExpiryConfig::default());
    ///
    /// // Sweeper runs in the background...
    ///
    /// drop(sweeper);
    /// ```
    pub fn start<E>(store: Store<E>, config: ExpiryConfig) -> Self
    where
        E: Engine + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(store, config, shutdown_rx));

        info!("Background expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the expiry sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("Background expiry sweeper stopped");
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop<E: Engine>(
    store: Store<E>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let wait = match store.next_deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .max(config.min_interval)
                .min(config.idle_interval),
            None => config.idle_interval,
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = store.scheduled() => {
                trace!("New expiration scheduled, recomputing deadline");
                continue;
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let expired = store.purge_expired();
        if expired > 0 {
            debug!(
                expired = expired,
                pending = store.pending_expirations(),
                "Expired keys cleaned up"
            );
        }
    }
}

/// Starts the expiry sweeper with default configuration.
pub fn start_expiry_sweeper<E>(store: Store<E>) -> ExpirySweeper
where
    E: Engine + 'static,
{
    ExpirySweeper::start(store, ExpiryConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{HashedStore, KeyValueStore, OrderedStore};

    #[test]
    fn test_queue_pops_earliest_first() {
        let now = Instant::now();
        let mut queue = ExpiryQueue::new();
        queue.schedule(now + Duration::from_secs(3), "c", 3);
        queue.schedule(now + Duration::from_secs(1), "a", 1);
        queue.schedule(now + Duration::from_secs(2), "b", 2);

        assert_eq!(queue.next_deadline(), Some(now + Duration::from_secs(1)));
        assert_eq!(queue.pop_due(now), None);

        let later = now + Duration::from_secs(2);
        assert_eq!(queue.pop_due(later), Some(("a", 1)));
        assert_eq!(queue.pop_due(later), Some(("b", 2)));
        assert_eq!(queue.pop_due(later), None);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_queue_equal_deadlines_keep_schedule_order() {
        let deadline = Instant::now();
        let mut queue = ExpiryQueue::new();
        for (i, key) in ["x", "y", "z"].into_iter().enumerate() {
            queue.schedule(deadline, key, i as EntryId);
        }

        let popped: Vec<_> = std::iter::from_fn(|| queue.pop_due(deadline)).collect();
        assert_eq!(popped, vec![("x", 0), ("y", 1), ("z", 2)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_retain_keeps_heap_order() {
        let now = Instant::now();
        let mut queue = ExpiryQueue::new();
        for i in 0..10u64 {
            queue.schedule(now + Duration::from_secs(10 - i), i, i);
        }

        queue.retain(|_, id| id % 2 == 0);
        assert_eq!(queue.len(), 5);

        let later = now + Duration::from_secs(60);
        let popped: Vec<_> = std::iter::from_fn(|| queue.pop_due(later)).collect();
        assert_eq!(popped, vec![(8, 8), (6, 6), (4, 4), (2, 2), (0, 0)]);
    }

    #[tokio::test]
    async fn test_sweeper_cleans_expired_keys() {
        let store: OrderedStore<String, String> = OrderedStore::ordered();

        // Add some keys with short TTL
        for i in 0..10 {
            store.set_with_ttl(
                format!("key{}", i),
                "value".to_string(),
                Duration::from_millis(50),
            );
        }

        // Add a persistent key
        store.set("persistent".to_string(), "value".to_string());

        let _sweeper = ExpirySweeper::start(store.clone(), ExpiryConfig::default());

        tokio::time::sleep(Duration::from_millis(300)).await;

        // stats() does not purge, so only the sweeper can have removed them
        let stats = store.stats();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.expired, 10);
        assert_eq!(store.pending_expirations(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_wakes_for_new_schedules() {
        let store: HashedStore<String, String> = HashedStore::hashed();

        let config = ExpiryConfig {
            idle_interval: Duration::from_secs(30),
            ..Default::default()
        };
        let _sweeper = ExpirySweeper::start(store.clone(), config);

        // Let the sweeper settle into its long idle sleep first.
        tokio::time::sleep(Duration::from_millis(20)).await;

        store.set_with_ttl("k".to_string(), "v".to_string(), Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(store.stats().keys, 0);
        assert_eq!(store.stats().expired, 1);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let store: OrderedStore<String, String> = OrderedStore::ordered();

        {
            let _sweeper = ExpirySweeper::start(store.clone(), ExpiryConfig::default());
            tokio::time::sleep(Duration::from_millis(20)).await;
            // Sweeper is dropped here
        }

        store.set_with_ttl("key".to_string(), "value".to_string(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Nobody purged in the background
        assert_eq!(store.stats().keys, 1);

        // but a foreground call purges lazily
        assert!(!store.exists(&"key".to_string()));
        assert_eq!(store.stats().expired, 1);
    }
}
