//! Command Handler Module
//!
//! This module implements the command layer of the twinkv shell.
//! It receives raw input lines, executes them against a [`KeyValueStore`]
//! and returns a [`Reply`] to print.
//!
//! ## Architecture
//!
//! ```text
//! Input line
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Split        │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ KeyValueStore   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! [`KeyValueStore`]: crate::storage::KeyValueStore

pub mod handler;
pub mod reply;

pub use handler::{CommandHandler, SharedStore, COMMANDS};
pub use reply::Reply;
