//! logbook: incremental journal ingestion for a space-sim companion app.
//!
//! This crate re-exports the two library layers and wires them together
//! from a [`Config`], so the binary, integration tests and benches build the
//! pipeline the same way.
//!
//! # Architecture
//!
//! ```text
//! DirectoryWatcher ──► IngestionScheduler ──► IncrementalReader ──► LineParser
//!                             │
//!                             ├──► JournalStore (dedup + atomic commit)
//!                             └──► EventSink (ScanIndex, printers, ...)
//! ```
//!
//! The scheduler is tick-driven; the host decides how often to call it.

pub use logbook_core as core;
pub use logbook_feeds as feeds;

use logbook_core::config::Config;
use logbook_core::{EventRegistry, JournalStore, LineParser, StoreResult};
use logbook_feeds::{
    DirectoryWatcher, IncrementalReader, IngestionScheduler, SchedulerSettings, WatchError,
    WatchSettings,
};

/// Event registry with the configured transient tags.
pub fn registry_from(cfg: &Config) -> EventRegistry {
    EventRegistry::with_transient_tags(&cfg.events.transient_tags)
}

pub fn reader_from(cfg: &Config) -> IncrementalReader {
    IncrementalReader::new(LineParser::new(registry_from(cfg)))
}

pub fn open_store(cfg: &Config) -> StoreResult<JournalStore> {
    let path = cfg.database.resolved_path();
    tracing::info!(path = %path.display(), "opening journal store");
    JournalStore::open(&path)
}

/// Watcher over the configured journal folder. OS notifications are not
/// started here.
pub fn watcher_from(cfg: &Config) -> Result<DirectoryWatcher, WatchError> {
    DirectoryWatcher::new(WatchSettings::from(&cfg.journal))
}

pub fn scheduler_from(
    cfg: &Config,
    store: JournalStore,
    watcher: DirectoryWatcher,
) -> IngestionScheduler<JournalStore> {
    IngestionScheduler::new(
        store,
        watcher,
        reader_from(cfg),
        SchedulerSettings::from(&cfg.scheduler),
    )
}
