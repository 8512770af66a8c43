//! Error types for the core layer.
//!
//! Parsing never fails with an error (see [`crate::parser::ParseOutcome`]);
//! only the store can surface failures to the caller.

use thiserror::Error;

/// Failures raised by [`crate::store::JournalStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stored payload for event {seq} is not a JSON object")]
    PayloadNotObject { seq: i64 },

    #[error("no file cursor with id {0}")]
    UnknownCursor(i64),

    #[error("no journal event with sequence id {0}")]
    UnknownEvent(i64),

    #[error("stored timestamp {millis} for event {seq} is out of range")]
    BadTimestamp { seq: i64, millis: i64 },
}

pub type StoreResult<T> = Result<T, StoreError>;
