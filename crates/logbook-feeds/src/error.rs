//! Error types for the feed layer.

use logbook_core::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// I/O failure while reading a journal file.
#[derive(Debug, Error)]
#[error("reading {path}: {source}")]
pub struct ReadError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl ReadError {
    pub fn new(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("filesystem notification error: {0}")]
    Notify(#[from] notify::Error),

    #[error("invalid file pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("walking journal folder: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Anything that can abort one ingestion step.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Watch(#[from] WatchError),
}

pub type IngestResult<T> = Result<T, IngestError>;
