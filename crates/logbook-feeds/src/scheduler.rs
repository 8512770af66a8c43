//! Ingestion scheduler: the live-tailing state machine.
//!
//! The scheduler is driven by an external tick and never schedules itself.
//! Each [`tick`](IngestionScheduler::tick) runs to completion: it reads at
//! most the active file plus one newly queued file, commits what it read,
//! and hands the result to every registered [`EventSink`].
//!
//! Policy per tick:
//!
//! 1. Continue the active file first. If that read yields events, stop.
//! 2. Otherwise switch to the next queued path the watcher reported.
//! 3. Otherwise, once enough idle ticks have passed and the active file is
//!    drained, run a fallback directory scan.
//! 4. Otherwise count an idle tick.
//!
//! Read failures are treated as "no progress this tick". Commit failures are
//! returned to the caller; the cursor is not advanced, so the same bytes are
//! read again on the next tick.

use crate::error::{IngestError, IngestResult};
use crate::reader::{IncrementalReader, ReadOutcome};
use crate::watcher::DirectoryWatcher;
use logbook_core::cursor::LogFormat;
use logbook_core::{EventSink, FileCursor, JournalBackend, JournalEvent, TransientEvent};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    ContinuingFile,
    SwitchingFile,
    FallbackScanning,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Consecutive idle ticks before a fallback directory scan.
    pub idle_ticks_before_rescan: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            idle_ticks_before_rescan: 30,
        }
    }
}

impl From<&logbook_core::config::SchedulerConfig> for SchedulerSettings {
    fn from(cfg: &logbook_core::config::SchedulerConfig) -> Self {
        Self {
            idle_ticks_before_rescan: cfg.idle_ticks_before_rescan,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    /// The last state the tick passed through.
    pub state: SchedulerState,
    /// File the events came from, if any were read.
    pub path: Option<PathBuf>,
    /// Events that survived dedup, with `seq` assigned.
    pub stored: Vec<JournalEvent>,
    pub transient: Vec<TransientEvent>,
}

impl TickOutput {
    fn idle(state: SchedulerState) -> Self {
        Self {
            state,
            path: None,
            stored: Vec::new(),
            transient: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty() && self.transient.is_empty()
    }
}

/// Result of reading and committing one file.
enum FileStep {
    /// The read produced events (stored may still be empty after dedup).
    Produced(TickOutput),
    /// Nothing new, or only lines that produced no events.
    Quiet,
    Missing,
}

// ---------------------------------------------------------------------------
// IngestionScheduler
// ---------------------------------------------------------------------------

pub struct IngestionScheduler<S: JournalBackend> {
    store: S,
    watcher: DirectoryWatcher,
    reader: IncrementalReader,
    settings: SchedulerSettings,
    sinks: Vec<Box<dyn EventSink>>,
    active: Option<FileCursor>,
    /// File length seen by the last read of the active file.
    active_len: u64,
    idle_ticks: u32,
    state: SchedulerState,
}

impl<S: JournalBackend> IngestionScheduler<S> {
    pub fn new(
        store: S,
        watcher: DirectoryWatcher,
        reader: IncrementalReader,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            store,
            watcher,
            reader,
            settings,
            sinks: Vec::new(),
            active: None,
            active_len: 0,
            idle_ticks: 0,
            state: SchedulerState::Idle,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn watcher(&self) -> &DirectoryWatcher {
        &self.watcher
    }

    pub fn watcher_mut(&mut self) -> &mut DirectoryWatcher {
        &mut self.watcher
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn active(&self) -> Option<&FileCursor> {
        self.active.as_ref()
    }

    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    /// Make `cursor` the file to continue, e.g. the last file of a history
    /// refresh.
    pub fn set_active(&mut self, cursor: FileCursor) {
        tracing::info!(path = %cursor.path.display(), pos = cursor.pos, "scheduler: active file handed over");
        self.active_len = cursor.pos;
        self.active = Some(cursor);
        self.state = SchedulerState::ContinuingFile;
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Run one polling step.
    pub fn tick(&mut self) -> IngestResult<TickOutput> {
        // 1. Drain the file in flight before looking at anything else.
        let mut opened_this_tick: HashSet<PathBuf> = HashSet::new();
        if let Some(active) = self.active.clone() {
            self.state = SchedulerState::ContinuingFile;
            opened_this_tick.insert(active.path.clone());
            match self.read_and_commit(active)? {
                FileStep::Produced(out) => return Ok(self.finish(out)),
                FileStep::Missing => {
                    tracing::info!("scheduler: active file disappeared");
                    self.active = None;
                }
                FileStep::Quiet => {}
            }
        }

        // 2. Switch to the next file the watcher reported.
        while let Some(path) = self.watcher.try_next() {
            if !self.watcher.matches(&path) || !opened_this_tick.insert(path.clone()) {
                continue;
            }
            self.state = SchedulerState::SwitchingFile;
            let cursor = self.store.load_or_create(&path)?;
            if cursor.kind.format == LogFormat::NetLog {
                tracing::warn!(path = %path.display(), "scheduler: net-log files are not tailed");
                continue;
            }
            tracing::info!(path = %path.display(), id = %cursor.id, "scheduler: switching file");
            let previous = self.active.replace(cursor.clone());
            self.active_len = cursor.pos;
            return match self.read_and_commit(cursor)? {
                FileStep::Produced(out) => Ok(self.finish(out)),
                FileStep::Missing => {
                    // A stale notification: keep tailing what we had.
                    if let Some(prev) = &previous {
                        self.active_len = prev.pos;
                    }
                    self.active = previous;
                    Ok(self.quiet())
                }
                FileStep::Quiet => Ok(self.quiet()),
            };
        }

        // 3. Fallback enumeration for notifications the OS dropped.
        let drained = self
            .active
            .as_ref()
            .map_or(true, |c| c.is_drained(self.active_len));
        if self.idle_ticks >= self.settings.idle_ticks_before_rescan && drained {
            self.state = SchedulerState::FallbackScanning;
            let found = self.fallback_scan()?;
            self.idle_ticks = 0;
            if let Some(cursor) = found {
                self.active = Some(cursor.clone());
                self.active_len = cursor.pos;
                return match self.read_and_commit(cursor)? {
                    FileStep::Produced(out) => Ok(self.finish(out)),
                    FileStep::Missing => {
                        self.active = None;
                        Ok(TickOutput::idle(self.state))
                    }
                    FileStep::Quiet => Ok(TickOutput::idle(self.state)),
                };
            }
            return Ok(TickOutput::idle(self.state));
        }

        // 4. Nothing to do.
        Ok(self.quiet())
    }

    fn finish(&mut self, out: TickOutput) -> TickOutput {
        self.idle_ticks = 0;
        out
    }

    fn quiet(&mut self) -> TickOutput {
        self.idle_ticks = self.idle_ticks.saturating_add(1);
        if self.active.is_none() {
            self.state = SchedulerState::Idle;
        }
        TickOutput::idle(self.state)
    }

    /// Enumeration errors are logged and swallowed; store errors are not.
    fn fallback_scan(&mut self) -> IngestResult<Option<FileCursor>> {
        let known = self.store.known_paths()?;
        let path = match self.watcher.fallback_scan(&known) {
            Ok(Some(path)) => path,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::warn!(error = %e, "scheduler: fallback scan failed");
                return Ok(None);
            }
        };
        let cursor = self.store.load_or_create(&path)?;
        if cursor.kind.format == LogFormat::NetLog {
            return Ok(None);
        }
        Ok(Some(cursor))
    }

    fn read_and_commit(&mut self, cursor: FileCursor) -> IngestResult<FileStep> {
        let batch = match self.reader.read_new_entries(&cursor, &mut self.store) {
            Ok(ReadOutcome::Batch(batch)) => batch,
            Ok(ReadOutcome::Missing) => return Ok(FileStep::Missing),
            Err(IngestError::Read(e)) => {
                tracing::warn!(error = %e, "scheduler: read failed, retrying next tick");
                return Ok(FileStep::Quiet);
            }
            Err(e) => return Err(e),
        };

        self.active_len = batch.file_len;
        if !batch.made_progress {
            return Ok(FileStep::Quiet);
        }

        let produced = !batch.is_empty();
        let next = batch.advance(&cursor);
        let stored = self.store.commit(batch.events, &next)?;
        self.active = Some(next);

        if !produced {
            return Ok(FileStep::Quiet);
        }
        for sink in &mut self.sinks {
            sink.on_new_events(&stored, &batch.transient);
        }
        Ok(FileStep::Produced(TickOutput {
            state: self.state,
            path: Some(cursor.path),
            stored,
            transient: batch.transient,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
