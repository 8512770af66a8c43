//! logbook-core: journal model, parsing and persistence.
//!
//! This crate owns everything that does not touch the live filesystem:
//! the event model, the pure line parser, the file cursor model, the
//! SQLite-backed store with its dedup gate, and the derived scan index.
//!
//! # Architecture
//!
//! ```text
//! line ──► LineParser ──► JournalEvent ──► DedupGate ──► JournalStore
//!                                                            │
//!                                           EventSink ◄──────┘
//! ```
//!
//! The file reader, watcher and scheduler that drive this pipeline live in
//! `logbook-feeds`.

pub mod config;
pub mod cursor;
pub mod dedup;
pub mod error;
pub mod event;
pub mod index;
pub mod parser;
pub mod store;

pub use cursor::{FileCursor, FileKind, LogFormat};
pub use dedup::{DedupGate, DedupKey, DedupLookup};
pub use error::{StoreError, StoreResult};
pub use event::{CommanderId, CursorId, EventDetails, EventTag, JournalEvent, TransientEvent};
pub use index::{EventSink, ScanIndex};
pub use parser::{EventRegistry, LineParser, ParseOutcome};
pub use store::{
    CommanderDirectory, CursorStore, EventQuery, JournalBackend, JournalStore, PersistenceWriter,
};
