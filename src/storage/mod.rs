//! Storage Module
//!
//! This module provides the core storage functionality for twinkv: two
//! interchangeable engines behind one [`KeyValueStore`] contract, with TTL
//! support and a background expiry sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  KeyValueStore (contract)                   │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Store<E>  (one store-wide Mutex)             │
//! │   ┌──────────────────────┐     ┌────────────────────────┐   │
//! │   │ engine: E            │     │ ExpiryQueue (min-heap) │   │
//! │   │  OrderedEngine (RB)  │     │ (deadline, key, id)    │   │
//! │   │  HashedEngine (runs) │     └────────────────────────┘   │
//! │   └──────────────────────┘                                  │
//! └──────────────────────────────▲──────────────────────────────┘
//!                                │
//!                  ┌─────────────┴─────────────┐
//!                  │       ExpirySweeper       │
//!                  │  (Background Tokio Task)  │
//!                  └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use twinkv::storage::{KeyValueStore, OrderedStore};
//! use std::time::Duration;
//!
//! let store: OrderedStore<String, String> = OrderedStore::ordered();
//!
//! assert!(store.set("name".to_string(), "Ariz".to_string()));
//! assert_eq!(store.get(&"name".to_string()).unwrap(), "Ariz");
//!
//! // Duplicate keys are rejected
//! assert!(!store.set("name".to_string(), "Other".to_string()));
//!
//! store.set_with_ttl(
//!     "session".to_string(),
//!     "token123".to_string(),
//!     Duration::from_secs(3600),
//! );
//! assert_eq!(store.keys(), vec!["name".to_string(), "session".to_string()]);
//! ```

pub mod entry;
pub mod expiry;
pub mod hashed;
pub mod ordered;
pub mod store;

pub use entry::{Entry, EntryId, ExactMatch, ValueEquality};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpiryQueue, ExpirySweeper};
pub use hashed::HashedEngine;
pub use ordered::OrderedEngine;
pub use store::{HashedStore, KeyValueStore, OrderedStore, Store, StoreStats};

/// The raw structure behind a [`Store`].
///
/// Engines know nothing about locking or expiry: they keep entries unique by
/// key and hand them back in their natural iteration order.
pub trait Engine: Send {
    type Key: Clone + Eq + Send;
    type Value: Send;

    /// Inserts `entry` unless its key is present. Returns `false` on a duplicate.
    fn insert(&mut self, entry: Entry<Self::Key, Self::Value>) -> bool;

    fn get(&self, key: &Self::Key) -> Option<&Entry<Self::Key, Self::Value>>;

    fn get_mut(&mut self, key: &Self::Key) -> Option<&mut Entry<Self::Key, Self::Value>>;

    fn remove(&mut self, key: &Self::Key) -> Option<Entry<Self::Key, Self::Value>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);

    /// All entries in the engine's iteration order.
    fn entries(&self) -> Box<dyn Iterator<Item = &Entry<Self::Key, Self::Value>> + '_>;

    /// Keys whose value matches `probe` under the engine's value equality.
    fn find(&self, probe: &Self::Value) -> Vec<Self::Key>;
}
