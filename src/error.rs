//! Error types shared by the storage layer and the command dispatcher.

use std::io;
use thiserror::Error;

/// Errors returned by [`KeyValueStore`](crate::storage::KeyValueStore) operations.
///
/// A duplicate key on `set` is not an error: it is reported as `false`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is not present (GET, TTL).
    #[error("key not found")]
    NotFound,

    /// The upload source or export destination could not be opened.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors produced while parsing a [`Record`](crate::record::Record) from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseRecordError {
    /// The text did not contain exactly five fields.
    #[error("expected 5 fields, found {0}")]
    FieldCount(usize),

    /// A numeric field (birthday or coins) was not an integer.
    #[error("invalid {field}: '{value}'")]
    InvalidNumber { field: &'static str, value: String },
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
