//! # twinkv - An Embedded Key-Value Store with Two Engines
//!
//! twinkv is an in-process key-value store with a Redis-like operation set.
//! The same [`KeyValueStore`] contract is served by two interchangeable
//! engines: a red-black tree that keeps keys sorted, and a chained hash table
//! that resizes itself as it grows.
//!
//! ## Features
//!
//! - **Two Engines**: [`OrderedEngine`](storage::OrderedEngine) (red-black tree)
//!   and [`HashedEngine`](storage::HashedEngine) (bucket runs with doubling resize)
//! - **TTL Support**: Keys can have a time-to-live with background cleanup
//! - **Thread Safe**: A store is a cheap handle that can be shared across threads
//! - **Text Transfer**: UPLOAD/EXPORT of `<key> <record>` lines
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               twinkv                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────────────────────┐  │
//! │  │ stdin shell │───>│  Command    │───>│       KeyValueStore         │  │
//! │  │  (binary)   │    │  Handler    │    │  Store<E>, one Mutex        │  │
//! │  └─────────────┘    └─────────────┘    │  ┌───────────┐ ┌──────────┐ │  │
//! │                                        │  │ engine E  │ │ Expiry   │ │  │
//! │                                        │  │ tree|hash │ │ Queue    │ │  │
//! │                                        │  └───────────┘ └──────────┘ │  │
//! │                                        └──────────────▲──────────────┘  │
//! │                                                       │                 │
//! │                                  ┌────────────────────┴──────────────┐  │
//! │                                  │          ExpirySweeper            │  │
//! │                                  │      (Background Tokio Task)      │  │
//! │                                  └───────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use twinkv::storage::{start_expiry_sweeper, KeyValueStore, OrderedStore};
//! use twinkv::Record;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store: OrderedStore<String, Record> = OrderedStore::ordered();
//!
//!     // Start the background expiry sweeper
//!     let _sweeper = start_expiry_sweeper(store.clone());
//!
//!     let ivan = Record::new("Ivan", "Petrov", 1999, "Moscow", 42);
//!     store.set_with_ttl("ivan".to_string(), ivan, Duration::from_secs(10));
//!
//!     println!("{:?}", store.ttl(&"ivan".to_string()));
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: Engines, the store contract and TTL expiry
//! - [`record`]: The record value type and its text form
//! - [`commands`]: Line command handlers used by the shell
//! - [`error`]: Error types
//!
//! ## Design Highlights
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: Every operation first removes entries that are already due
//! 2. **Active**: A background task sleeps until the next deadline and cleans up
//!
//! This ensures memory is reclaimed even for keys that are never accessed again.

pub mod commands;
pub mod error;
pub mod record;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandHandler, Reply};
pub use error::{ParseRecordError, StoreError};
pub use record::Record;
pub use storage::{
    start_expiry_sweeper, ExpiryConfig, ExpirySweeper, HashedStore, KeyValueStore, OrderedStore,
};

/// Version of twinkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
