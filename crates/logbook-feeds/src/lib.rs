//! logbook-feeds: journal folder ingestion for logbook.
//!
//! The live path is [`IngestionScheduler`]: a tick-driven state machine over
//! a [`DirectoryWatcher`] and an [`IncrementalReader`]. The bulk path is
//! [`HistoryRefresh`]. Both commit through a
//! [`logbook_core::JournalBackend`].

pub mod error;
pub mod reader;
pub mod refresh;
pub mod scheduler;
pub mod watcher;

pub use error::{IngestError, IngestResult, ReadError, WatchError};
pub use reader::{IncrementalReader, ReadBatch, ReadOutcome};
pub use refresh::{HistoryRefresh, RefreshProgress, RefreshSummary};
pub use scheduler::{IngestionScheduler, SchedulerSettings, SchedulerState, TickOutput};
pub use watcher::{DirectoryWatcher, JournalFile, WatchSettings};
