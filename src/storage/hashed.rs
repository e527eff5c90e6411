//! Hashed Engine: a Chained Hash Table with Bucket Runs
//!
//! All entries live in one doubly linked sequence stored in an arena. Entries
//! that hash to the same bucket are kept next to each other (a "bucket run"),
//! and a separate bucket index records where each run starts:
//!
//! ```text
//!  buckets:   [0]──────┐   [1]: None   [2]──────────────┐
//!                      ▼                                ▼
//!  sequence:  head ─> (a,b0) <-> (c,b0) <-> (d,b0) <-> (e,b2) <-> (f,b2) <- tail
//! ```
//!
//! A bucket is scanned from its run head until the first entry whose cached
//! bucket number differs. New entries are placed in front of their run (and
//! become the new head) or appended at the tail when the bucket is empty.
//!
//! The table doubles its bucket count before an insertion that would bring the
//! load factor (`len / buckets`) to [`RESIZE_THRESHOLD`] or above, rebuilding
//! the sequence run by run.

use super::entry::{Entry, ExactMatch, ValueEquality};
use super::Engine;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use tracing::debug;

/// Bucket count of a freshly created table.
pub const DEFAULT_BUCKETS: usize = 1;

/// Load factor at which the table grows.
pub const RESIZE_THRESHOLD: f64 = 0.75;

/// Multiplier applied to the bucket count on resize.
pub const GROWTH_FACTOR: usize = 2;

type SlotId = usize;

struct Slot<K, V> {
    entry: Entry<K, V>,
    /// Bucket number cached at insertion (or last resize)
    bucket: usize,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

/// A hash table keyed store with O(1) amortized operations.
///
/// Iteration follows the internal sequence, which is stable for the lifetime
/// of the table between resizes.
pub struct HashedEngine<K, V, Q = ExactMatch> {
    slots: Vec<Slot<K, V>>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
    buckets: Vec<Option<SlotId>>,
    equality: Q,
}

impl<K, V, Q> fmt::Debug for HashedEngine<K, V, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashedEngine")
            .field("len", &self.slots.len())
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

impl<K: Hash + Eq, V> Default for HashedEngine<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq, V> HashedEngine<K, V> {
    /// Creates an empty table with [`DEFAULT_BUCKETS`] buckets.
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }

    /// Creates an empty table with `buckets` buckets (at least one).
    pub fn with_buckets(buckets: usize) -> Self {
        Self::with_equality(buckets, ExactMatch)
    }
}

impl<K: Hash + Eq, V, Q> HashedEngine<K, V, Q> {
    /// Creates an empty table using `equality` for FIND.
    pub fn with_equality(buckets: usize, equality: Q) -> Self {
        Self {
            slots: Vec::new(),
            head: None,
            tail: None,
            buckets: vec![None; buckets.max(1)],
            equality,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Entries per bucket.
    pub fn load_factor(&self) -> f64 {
        self.slots.len() as f64 / self.buckets.len() as f64
    }

    /// Iterates over entries in sequence order.
    pub fn iter(&self) -> Iter<'_, K, V, Q> {
        Iter {
            table: self,
            next: self.head,
        }
    }

    /// Inserts `entry` unless its key is already present, growing the table
    /// first if the insertion would reach the resize threshold.
    pub fn insert(&mut self, entry: Entry<K, V>) -> bool {
        if self.lookup(&entry.key).is_some() {
            return false;
        }

        while (self.slots.len() + 1) as f64 / self.buckets.len() as f64 >= RESIZE_THRESHOLD {
            self.resize(self.buckets.len() * GROWTH_FACTOR);
        }

        let bucket = self.bucket_for(&entry.key, self.buckets.len());
        self.link(entry, bucket);
        true
    }

    pub fn get(&self, key: &K) -> Option<&Entry<K, V>> {
        self.lookup(key).map(|id| &self.slots[id].entry)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut Entry<K, V>> {
        self.lookup(key).map(|id| &mut self.slots[id].entry)
    }

    /// Removes and returns the entry stored under `key`.
    pub fn remove(&mut self, key: &K) -> Option<Entry<K, V>> {
        let id = self.lookup(key)?;
        let bucket = self.slots[id].bucket;

        if self.buckets[bucket] == Some(id) {
            // The run continues only if the next entry shares the bucket.
            self.buckets[bucket] = self.slots[id]
                .next
                .filter(|&next| self.slots[next].bucket == bucket);
        }

        self.unlink(id);
        Some(self.release(id))
    }

    /// Removes every entry, keeping the current bucket count.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = None;
        self.tail = None;
        self.buckets.iter_mut().for_each(|bucket| *bucket = None);
    }

    fn bucket_for(&self, key: &K, buckets: usize) -> usize {
        if buckets == 1 {
            return 0;
        }
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % buckets
    }

    fn lookup(&self, key: &K) -> Option<SlotId> {
        let bucket = self.bucket_for(key, self.buckets.len());
        let mut cursor = self.buckets[bucket];

        while let Some(id) = cursor {
            let slot = &self.slots[id];
            if slot.bucket != bucket {
                break;
            }
            if slot.entry.key == *key {
                return Some(id);
            }
            cursor = slot.next;
        }
        None
    }

    /// Places a new slot at the front of its bucket run, or at the tail when
    /// the bucket is empty, and makes it the run head.
    fn link(&mut self, entry: Entry<K, V>, bucket: usize) {
        let id = self.slots.len();

        match self.buckets[bucket] {
            Some(run_head) => {
                let prev = self.slots[run_head].prev;
                self.slots.push(Slot {
                    entry,
                    bucket,
                    prev,
                    next: Some(run_head),
                });
                self.slots[run_head].prev = Some(id);
                match prev {
                    Some(prev) => self.slots[prev].next = Some(id),
                    None => self.head = Some(id),
                }
            }
            None => {
                self.slots.push(Slot {
                    entry,
                    bucket,
                    prev: self.tail,
                    next: None,
                });
                match self.tail {
                    Some(tail) => self.slots[tail].next = Some(id),
                    None => self.head = Some(id),
                }
                self.tail = Some(id);
            }
        }

        self.buckets[bucket] = Some(id);
    }

    fn unlink(&mut self, id: SlotId) {
        let (prev, next) = (self.slots[id].prev, self.slots[id].next);
        match prev {
            Some(prev) => self.slots[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.slots[next].prev = prev,
            None => self.tail = prev,
        }
    }

    /// Frees the slot of an unlinked entry by moving the last slot into it.
    fn release(&mut self, id: SlotId) -> Entry<K, V> {
        let last = self.slots.len() - 1;

        if id != last {
            let (prev, next, bucket) = {
                let moved = &self.slots[last];
                (moved.prev, moved.next, moved.bucket)
            };
            match prev {
                Some(prev) => self.slots[prev].next = Some(id),
                None => self.head = Some(id),
            }
            match next {
                Some(next) => self.slots[next].prev = Some(id),
                None => self.tail = Some(id),
            }
            if self.buckets[bucket] == Some(last) {
                self.buckets[bucket] = Some(id);
            }
        }

        self.slots.swap_remove(id).entry
    }

    /// Rebuilds the table with `buckets` buckets, re-inserting entries in
    /// their current sequence order.
    fn resize(&mut self, buckets: usize) {
        let order: Vec<SlotId> = {
            let mut order = Vec::with_capacity(self.slots.len());
            let mut cursor = self.head;
            while let Some(id) = cursor {
                order.push(id);
                cursor = self.slots[id].next;
            }
            order
        };

        let mut drained: Vec<Option<Entry<K, V>>> = std::mem::take(&mut self.slots)
            .into_iter()
            .map(|slot| Some(slot.entry))
            .collect();

        debug!(
            from = self.buckets.len(),
            to = buckets,
            entries = drained.len(),
            "Resizing hash table"
        );

        self.head = None;
        self.tail = None;
        self.buckets = vec![None; buckets];
        self.slots.reserve(drained.len());

        for id in order {
            if let Some(entry) = drained[id].take() {
                let bucket = self.bucket_for(&entry.key, buckets);
                self.link(entry, bucket);
            }
        }
    }
}

impl<K, V, Q> Engine for HashedEngine<K, V, Q>
where
    K: Hash + Eq + Clone + Send,
    V: Send,
    Q: ValueEquality<V>,
{
    type Key = K;
    type Value = V;

    fn insert(&mut self, entry: Entry<K, V>) -> bool {
        HashedEngine::insert(self, entry)
    }

    fn get(&self, key: &K) -> Option<&Entry<K, V>> {
        HashedEngine::get(self, key)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut Entry<K, V>> {
        HashedEngine::get_mut(self, key)
    }

    fn remove(&mut self, key: &K) -> Option<Entry<K, V>> {
        HashedEngine::remove(self, key)
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn clear(&mut self) {
        HashedEngine::clear(self)
    }

    fn entries(&self) -> Box<dyn Iterator<Item = &Entry<K, V>> + '_> {
        Box::new(self.iter())
    }

    fn find(&self, probe: &V) -> Vec<K> {
        self.iter()
            .filter(|entry| self.equality.matches(&entry.value, probe))
            .map(|entry| entry.key.clone())
            .collect()
    }
}

/// Sequence-order iterator over a [`HashedEngine`].
pub struct Iter<'a, K, V, Q> {
    table: &'a HashedEngine<K, V, Q>,
    next: Option<SlotId>,
}

impl<'a, K, V, Q> Iterator for Iter<'a, K, V, Q> {
    type Item = &'a Entry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let slot = &self.table.slots[id];
        self.next = slot.next;
        Some(&slot.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn entry(key: u32) -> Entry<u32, String> {
        Entry::new(key as u64, key, format!("v{}", key))
    }

    /// Asserts that every bucket's entries form one contiguous run starting
    /// at the bucket pointer, and that the links are consistent.
    fn check_runs<K: Hash + Eq, V, Q>(table: &HashedEngine<K, V, Q>) {
        let mut order = Vec::new();
        let mut cursor = table.head;
        let mut prev = None;
        while let Some(id) = cursor {
            assert_eq!(table.slots[id].prev, prev, "broken back link");
            order.push(id);
            prev = Some(id);
            cursor = table.slots[id].next;
        }
        assert_eq!(table.tail, prev);
        assert_eq!(order.len(), table.len(), "every slot must be linked");

        let mut finished = HashSet::new();
        let mut current_bucket = None;
        for &id in &order {
            let slot = &table.slots[id];
            assert_eq!(slot.bucket, table.bucket_for(&slot.entry.key, table.bucket_count()));
            if current_bucket != Some(slot.bucket) {
                assert!(finished.insert(slot.bucket), "bucket run split in two");
                assert_eq!(table.buckets[slot.bucket], Some(id), "run head mismatch");
                current_bucket = Some(slot.bucket);
            }
        }
        for (bucket, head) in table.buckets.iter().enumerate() {
            assert_eq!(head.is_some(), finished.contains(&bucket));
        }
    }

    #[test]
    fn test_insert_get_remove() {
        let mut table = HashedEngine::new();
        assert!(table.insert(entry(1)));
        assert!(table.insert(entry(2)));
        assert_eq!(table.get(&1).unwrap().value, "v1");
        assert!(table.get(&3).is_none());

        assert_eq!(table.remove(&1).unwrap().value, "v1");
        assert!(table.remove(&1).is_none());
        assert!(table.get(&1).is_none());
        assert_eq!(table.get(&2).unwrap().value, "v2");
        check_runs(&table);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut table = HashedEngine::new();
        assert!(table.insert(entry(7)));
        assert!(!table.insert(Entry::new(99, 7, "other".to_string())));
        assert_eq!(table.get(&7).unwrap().value, "v7");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_resize_from_single_bucket() {
        let mut table = HashedEngine::with_buckets(1);
        assert_eq!(table.bucket_count(), 1);

        for key in 0..4 {
            assert!(table.insert(entry(key)));
        }

        assert!(table.bucket_count() > 1);
        for key in 0..4 {
            assert_eq!(table.get(&key).unwrap().value, format!("v{}", key));
        }
        check_runs(&table);
    }

    #[test]
    fn test_load_factor_after_every_insert() {
        let mut table = HashedEngine::new();
        for key in 0..1000 {
            table.insert(entry(key));
            assert!(
                table.load_factor() < RESIZE_THRESHOLD,
                "load factor {} after {} inserts",
                table.load_factor(),
                key + 1
            );
        }
        check_runs(&table);
    }

    #[test]
    fn test_remove_run_heads_keeps_runs_intact() {
        let mut table = HashedEngine::with_buckets(64);
        for key in 0..40 {
            table.insert(entry(key));
        }
        check_runs(&table);

        // Drop every current run head, then everything else in sequence order.
        let heads: Vec<u32> = table
            .buckets
            .iter()
            .flatten()
            .map(|&id| table.slots[id].entry.key)
            .collect();
        for key in heads {
            assert!(table.remove(&key).is_some());
            check_runs(&table);
        }

        let rest: Vec<u32> = table.iter().map(|entry| entry.key).collect();
        for key in rest {
            assert!(table.remove(&key).is_some());
            check_runs(&table);
        }
        assert!(table.is_empty());
        assert_eq!(table.head, None);
        assert_eq!(table.tail, None);
    }

    #[test]
    fn test_every_key_retrievable_after_mixed_operations() {
        let mut table = HashedEngine::new();
        for key in 0..300 {
            table.insert(entry(key));
            if key % 4 == 0 {
                table.remove(&(key / 2));
            }
        }
        check_runs(&table);

        let keys: HashSet<u32> = table.iter().map(|entry| entry.key).collect();
        assert_eq!(keys.len(), table.len());
        for key in 0..300 {
            assert_eq!(table.get(&key).is_some(), keys.contains(&key));
        }
    }

    #[test]
    fn test_iteration_order_stable_without_resize() {
        let mut table = HashedEngine::with_buckets(256);
        for key in 0..20 {
            table.insert(entry(key));
        }
        let first: Vec<u32> = table.iter().map(|entry| entry.key).collect();
        let second: Vec<u32> = table.iter().map(|entry| entry.key).collect();
        assert_eq!(first, second);
        assert_eq!(table.bucket_count(), 256);
    }

    #[test]
    fn test_clear_keeps_buckets() {
        let mut table = HashedEngine::new();
        for key in 0..10 {
            table.insert(entry(key));
        }
        let buckets = table.bucket_count();
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.bucket_count(), buckets);
        assert!(table.get(&3).is_none());
        assert!(table.insert(entry(3)));
        check_runs(&table);
    }

    #[test]
    fn test_find_uses_equality() {
        let mut table = HashedEngine::new();
        table.insert(Entry::new(1, "a", 5u32));
        table.insert(Entry::new(2, "b", 6u32));
        table.insert(Entry::new(3, "c", 5u32));

        let mut found = Engine::find(&table, &5);
        found.sort();
        assert_eq!(found, vec!["a", "c"]);
    }
}
