//! The KeyValueStore Contract and its Locked Implementation
//!
//! [`KeyValueStore`] is the only surface callers use. [`Store`] implements it
//! once for any [`Engine`], so both engines share the same TTL handling,
//! error reporting and upload/export code.
//!
//! ## Concurrency Model
//!
//! All foreground operations and the expiry sweeper take the same store-wide
//! lock around the engine and its [`ExpiryQueue`]. A `Store` is a cheap handle
//! (`Arc` inside) that can be cloned into other threads or tasks.

use super::entry::{Entry, EntryId};
use super::expiry::ExpiryQueue;
use super::hashed::HashedEngine;
use super::ordered::OrderedEngine;
use super::Engine;
use crate::error::{Result, StoreError};
use parking_lot::{Mutex, MutexGuard};
use std::fmt::{self, Display};
use std::fs::File;
use std::hash::Hash;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{debug, info, trace, warn};

/// The operation set every store offers, whatever engine backs it.
pub trait KeyValueStore: Send + Sync {
    type Key;
    type Value;

    /// Inserts `key` if it is absent. Returns `false` and changes nothing if
    /// the key already exists.
    fn set(&self, key: Self::Key, value: Self::Value) -> bool;

    /// Like [`set`](Self::set), and schedules removal after `ttl`.
    /// A zero `ttl` means no expiry.
    fn set_with_ttl(&self, key: Self::Key, value: Self::Value, ttl: Duration) -> bool;

    /// Returns a copy of the value, or [`StoreError::NotFound`].
    fn get(&self, key: &Self::Key) -> Result<Self::Value>;

    fn exists(&self, key: &Self::Key) -> bool;

    /// Removes `key`. Returns `false` if it was absent.
    fn del(&self, key: &Self::Key) -> bool;

    /// Replaces the value of an existing key, leaving its TTL running.
    fn update(&self, key: &Self::Key, value: Self::Value) -> bool;

    /// All keys in the engine's iteration order.
    fn keys(&self) -> Vec<Self::Key>;

    /// Moves the value of `old` to `new`, overwriting `new` if it exists.
    /// The moved entry starts without TTL. Returns `false` if `old` is absent.
    fn rename(&self, old: &Self::Key, new: Self::Key) -> bool;

    /// Remaining whole seconds of `key`'s TTL (`None` if it has none), or
    /// [`StoreError::NotFound`]. May be negative until the entry is purged.
    fn ttl(&self, key: &Self::Key) -> Result<Option<i64>>;

    /// Keys whose value matches `value`.
    fn find(&self, value: &Self::Value) -> Vec<Self::Key>;

    /// All values, in the same order as [`keys`](Self::keys).
    fn showall(&self) -> Vec<Self::Value>;

    /// Loads `<key> <value>` lines from `path`, returning how many new keys
    /// were inserted. Duplicates are skipped; a malformed line ends the load.
    fn upload(&self, path: &Path) -> Result<usize>;

    /// Writes every entry to `path` as `<key> <value>` lines, returning the
    /// number of lines written.
    fn export(&self, path: &Path) -> Result<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry and every pending expiration.
    fn clear(&self);

    /// Current counters. Does not purge due entries.
    fn stats(&self) -> StoreStats;
}

/// A store backed by the red-black tree.
pub type OrderedStore<K, V> = Store<OrderedEngine<K, V>>;

/// A store backed by the chained hash table.
pub type HashedStore<K, V> = Store<HashedEngine<K, V>>;

/// Store statistics.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Entries physically present (expired ones not yet purged included)
    pub keys: u64,
    pub sets: u64,
    pub gets: u64,
    pub dels: u64,
    /// Entries removed because their TTL elapsed
    pub expired: u64,
    /// Items waiting in the expiration queue
    pub pending_expirations: u64,
}

#[derive(Default)]
struct Counters {
    sets: AtomicU64,
    gets: AtomicU64,
    dels: AtomicU64,
    expired: AtomicU64,
}

struct State<E: Engine> {
    engine: E,
    expirations: ExpiryQueue<E::Key>,
    next_id: EntryId,
    /// Queue items whose entry was deleted or renamed before its deadline
    stale: usize,
}

impl<E: Engine> State<E> {
    fn next_id(&mut self) -> EntryId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Removes every entry whose scheduled deadline is at or before `now`.
    fn purge(&mut self, now: Instant) -> u64 {
        let mut expired = 0;
        while let Some((key, id)) = self.expirations.pop_due(now) {
            let current = self.engine.get(&key).is_some_and(|entry| entry.id == id);
            if current {
                self.engine.remove(&key);
                expired += 1;
            } else {
                self.stale = self.stale.saturating_sub(1);
                trace!(entry_id = id, "Skipping stale expiration");
            }
        }
        expired
    }

    /// Removes `key` ahead of any expiration. Its queue item turns stale, and
    /// the queue is compacted once stale items outnumber live ones.
    fn remove(&mut self, key: &E::Key) -> Option<Entry<E::Key, E::Value>> {
        let entry = self.engine.remove(key)?;
        if entry.expires_at().is_some() {
            self.stale += 1;
            if self.stale * 2 > self.expirations.len() {
                self.compact();
            }
        }
        Some(entry)
    }

    /// Drops every queue item that no longer matches a stored entry.
    fn compact(&mut self) {
        let before = self.expirations.len();
        let engine = &self.engine;
        self.expirations
            .retain(|key, id| engine.get(key).is_some_and(|entry| entry.id == id));
        self.stale = 0;
        trace!(
            dropped = before - self.expirations.len(),
            "Compacted expiration queue"
        );
    }
}

struct Shared<E: Engine> {
    state: Mutex<State<E>>,
    wakeup: Notify,
    counters: Counters,
}

/// A thread-safe key-value store over engine `E`.
pub struct Store<E: Engine> {
    shared: Arc<Shared<E>>,
}

impl<E: Engine> Clone for Store<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: Engine> fmt::Debug for Store<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Store")
            .field("len", &state.engine.len())
            .field("pending_expirations", &state.expirations.len())
            .finish()
    }
}

impl<E: Engine + Default> Default for Store<E> {
    fn default() -> Self {
        Self::new(E::default())
    }
}

impl<K, V> Store<OrderedEngine<K, V>>
where
    K: Ord + Clone + Send,
    V: PartialEq + Send,
{
    /// Creates an empty store backed by the red-black tree.
    pub fn ordered() -> Self {
        Self::new(OrderedEngine::new())
    }
}

impl<K, V> Store<HashedEngine<K, V>>
where
    K: Hash + Eq + Clone + Send,
    V: PartialEq + Send,
{
    /// Creates an empty store backed by the hash table.
    pub fn hashed() -> Self {
        Self::new(HashedEngine::new())
    }
}

impl<E: Engine> Store<E> {
    /// Wraps an (empty or pre-filled) engine.
    pub fn new(engine: E) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    engine,
                    expirations: ExpiryQueue::new(),
                    next_id: 0,
                    stale: 0,
                }),
                wakeup: Notify::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// Locks the store and purges everything that is already due.
    fn lock(&self) -> MutexGuard<'_, State<E>> {
        let mut state = self.shared.state.lock();
        let expired = state.purge(Instant::now());
        if expired > 0 {
            self.shared
                .counters
                .expired
                .fetch_add(expired, Ordering::Relaxed);
            trace!(expired = expired, "Purged expired keys");
        }
        state
    }

    /// Removes due entries now. Returns how many were removed.
    pub fn purge_expired(&self) -> u64 {
        let mut state = self.shared.state.lock();
        let expired = state.purge(Instant::now());
        if expired > 0 {
            self.shared
                .counters
                .expired
                .fetch_add(expired, Ordering::Relaxed);
        }
        expired
    }

    /// The earliest pending expiration deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.shared.state.lock().expirations.next_deadline()
    }

    /// Number of scheduled expirations not yet processed.
    pub fn pending_expirations(&self) -> usize {
        self.shared.state.lock().expirations.len()
    }

    /// Completes when a new expiration has been scheduled.
    pub(crate) fn scheduled(&self) -> Notified<'_> {
        self.shared.wakeup.notified()
    }

    /// Runs `f` with shared access to the engine, without purging.
    pub fn with_engine<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        f(&self.shared.state.lock().engine)
    }

    fn insert(&self, key: E::Key, value: E::Value, ttl: Option<Duration>) -> bool {
        self.shared.counters.sets.fetch_add(1, Ordering::Relaxed);

        let mut state = self.lock();
        let id = state.next_id();
        let entry = match ttl {
            Some(ttl) => Entry::with_ttl(id, key, value, ttl),
            None => Entry::new(id, key, value),
        };
        let scheduled = entry
            .expires_at()
            .map(|deadline| (deadline, entry.key.clone()));

        if !state.engine.insert(entry) {
            return false;
        }

        if let Some((deadline, key)) = scheduled {
            state.expirations.schedule(deadline, key, id);
            drop(state);
            self.shared.wakeup.notify_one();
            trace!(entry_id = id, "Expiration scheduled");
        }
        true
    }
}

/// Splits `<key> <value...>` into its parts.
fn parse_line<K: FromStr, V: FromStr>(line: &str) -> Option<(K, V)> {
    let (key, value) = line.trim().split_once(char::is_whitespace)?;
    Some((key.parse().ok()?, value.trim_start().parse().ok()?))
}

impl<E> KeyValueStore for Store<E>
where
    E: Engine,
    E::Key: FromStr + Display,
    E::Value: Clone + FromStr + Display,
{
    type Key = E::Key;
    type Value = E::Value;

    fn set(&self, key: E::Key, value: E::Value) -> bool {
        self.insert(key, value, None)
    }

    fn set_with_ttl(&self, key: E::Key, value: E::Value, ttl: Duration) -> bool {
        self.insert(key, value, Some(ttl))
    }

    fn get(&self, key: &E::Key) -> Result<E::Value> {
        self.shared.counters.gets.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .engine
            .get(key)
            .map(|entry| entry.value.clone())
            .ok_or(StoreError::NotFound)
    }

    fn exists(&self, key: &E::Key) -> bool {
        self.lock().engine.get(key).is_some()
    }

    fn del(&self, key: &E::Key) -> bool {
        self.shared.counters.dels.fetch_add(1, Ordering::Relaxed);
        self.lock().remove(key).is_some()
    }

    fn update(&self, key: &E::Key, value: E::Value) -> bool {
        match self.lock().engine.get_mut(key) {
            Some(entry) => {
                entry.value = value;
                true
            }
            None => false,
        }
    }

    fn keys(&self) -> Vec<E::Key> {
        self.lock()
            .engine
            .entries()
            .map(|entry| entry.key.clone())
            .collect()
    }

    fn rename(&self, old: &E::Key, new: E::Key) -> bool {
        let mut state = self.lock();

        if *old == new {
            return state.engine.get(old).is_some();
        }

        let Some(entry) = state.remove(old) else {
            return false;
        };
        if state.remove(&new).is_some() {
            debug!(key = %new, "Rename overwrote an existing key");
        }

        let id = state.next_id();
        state.engine.insert(Entry::new(id, new, entry.value))
    }

    fn ttl(&self, key: &E::Key) -> Result<Option<i64>> {
        self.lock()
            .engine
            .get(key)
            .map(Entry::ttl_secs)
            .ok_or(StoreError::NotFound)
    }

    fn find(&self, value: &E::Value) -> Vec<E::Key> {
        self.lock().engine.find(value)
    }

    fn showall(&self) -> Vec<E::Value> {
        self.lock()
            .engine
            .entries()
            .map(|entry| entry.value.clone())
            .collect()
    }

    fn upload(&self, path: &Path) -> Result<usize> {
        let file = File::open(path)?;
        let mut loaded = 0;

        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Upload stopped by read error");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let Some((key, value)) = parse_line(&line) else {
                debug!(path = %path.display(), line = %line, "Upload stopped at malformed line");
                break;
            };
            if self.set(key, value) {
                loaded += 1;
            }
        }

        info!(path = %path.display(), loaded = loaded, "Upload finished");
        Ok(loaded)
    }

    fn export(&self, path: &Path) -> Result<usize> {
        let lines: Vec<String> = self
            .lock()
            .engine
            .entries()
            .map(|entry| format!("{} {}", entry.key, entry.value))
            .collect();

        let mut out = BufWriter::new(File::create(path)?);
        for line in &lines {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;

        info!(path = %path.display(), exported = lines.len(), "Export finished");
        Ok(lines.len())
    }

    fn len(&self) -> usize {
        self.lock().engine.len()
    }

    fn clear(&self) {
        let mut state = self.shared.state.lock();
        state.engine.clear();
        state.expirations.clear();
        state.stale = 0;
    }

    fn stats(&self) -> StoreStats {
        let (keys, pending) = {
            let state = self.shared.state.lock();
            (state.engine.len() as u64, state.expirations.len() as u64)
        };
        let counters = &self.shared.counters;
        StoreStats {
            keys,
            sets: counters.sets.load(Ordering::Relaxed),
            gets: counters.gets.load(Ordering::Relaxed),
            dels: counters.dels.load(Ordering::Relaxed),
            expired: counters.expired.load(Ordering::Relaxed),
            pending_expirations: pending,
        }
    }
}
