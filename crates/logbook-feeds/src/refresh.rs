//! History refresh: the bulk ingestion path.
//!
//! Processes every journal file above the history floor in one pass, oldest
//! modification time first. The last `reload_last_n` files are reparsed from
//! offset 0 with fresh in-memory cursors; the dedup gate keeps that from
//! storing anything twice.
//!
//! Refresh and the live scheduler are exclusive modes. When a refresh
//! finishes, [`RefreshSummary::last`] is the cursor the scheduler should
//! continue from.

use crate::error::{IngestError, IngestResult};
use crate::reader::{IncrementalReader, ReadOutcome};
use crate::watcher::DirectoryWatcher;
use logbook_core::cursor::LogFormat;
use logbook_core::{CommanderId, EventSink, FileCursor, JournalBackend};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshProgress<'p> {
    /// About to process file `index` (0-based) of `total`.
    File {
        index: usize,
        total: usize,
        path: &'p Path,
    },
    Done,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshSummary {
    pub files_read: usize,
    pub events_stored: usize,
    pub cancelled: bool,
    /// Cursor of the last file processed, as committed.
    pub last: Option<FileCursor>,
}

pub struct HistoryRefresh<'a, S: JournalBackend> {
    store: &'a mut S,
    watcher: &'a DirectoryWatcher,
    reader: IncrementalReader,
    reload_last_n: usize,
    sinks: Vec<Box<dyn EventSink + 'a>>,
}

impl<'a, S: JournalBackend> HistoryRefresh<'a, S> {
    pub fn new(
        store: &'a mut S,
        watcher: &'a DirectoryWatcher,
        reader: IncrementalReader,
        reload_last_n: usize,
    ) -> Self {
        Self {
            store,
            watcher,
            reader,
            reload_last_n,
            sinks: Vec::new(),
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink + 'a>) {
        self.sinks.push(sink);
    }

    /// Select the files that need reading.
    ///
    /// Every matching file above the floor gets a cursor (new ones are
    /// registered in a single transaction). A file is selected when its
    /// cursor has not caught up with its length, when it is among the last
    /// `reload_last_n` (those restart at offset 0), or when it is the newest
    /// file.
    pub fn scan_journal_files(&mut self) -> IngestResult<Vec<FileCursor>> {
        let files = self.watcher.enumerate()?;
        let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
        let cursors = self.store.register_all(&paths)?;

        let total = files.len();
        let reload_from = total.saturating_sub(self.reload_last_n);
        let mut selected = Vec::new();
        for (i, (file, mut cursor)) in files.iter().zip(cursors).enumerate() {
            if cursor.kind.format == LogFormat::NetLog {
                continue;
            }
            if i >= reload_from {
                cursor.pos = 0;
                cursor.commander_id = CommanderId::UNRESOLVED;
            }
            if cursor.pos != file.len || i + 1 == total {
                selected.push(cursor);
            }
        }
        tracing::info!(
            found = total,
            selected = selected.len(),
            reload_last_n = self.reload_last_n,
            "refresh: scanned journal folder"
        );
        Ok(selected)
    }

    /// Read and commit each cursor in order. Cancellation is checked between
    /// files only, so a file is either fully committed or not started.
    pub fn process(
        &mut self,
        cursors: Vec<FileCursor>,
        cancel: &CancellationToken,
        mut progress: impl FnMut(RefreshProgress<'_>),
    ) -> IngestResult<RefreshSummary> {
        let total = cursors.len();
        let mut summary = RefreshSummary::default();

        for (index, cursor) in cursors.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(done = index, total, "refresh: cancelled");
                summary.cancelled = true;
                break;
            }
            progress(RefreshProgress::File {
                index,
                total,
                path: &cursor.path,
            });

            let batch = match self.reader.read_new_entries(&cursor, &mut *self.store) {
                Ok(ReadOutcome::Batch(batch)) => batch,
                Ok(ReadOutcome::Missing) => {
                    tracing::info!(path = %cursor.path.display(), "refresh: file vanished");
                    continue;
                }
                Err(IngestError::Read(e)) => {
                    tracing::warn!(error = %e, "refresh: skipping unreadable file");
                    continue;
                }
                Err(e) => return Err(e),
            };
            summary.files_read += 1;

            let next = batch.advance(&cursor);
            if batch.made_progress {
                let stored = self.store.commit(batch.events, &next)?;
                summary.events_stored += stored.len();
                if !stored.is_empty() || !batch.transient.is_empty() {
                    for sink in &mut self.sinks {
                        sink.on_new_events(&stored, &batch.transient);
                    }
                }
            }
            summary.last = Some(next);
        }

        progress(RefreshProgress::Done);
        tracing::info!(
            files = summary.files_read,
            stored = summary.events_stored,
            cancelled = summary.cancelled,
            "refresh: finished"
        );
        Ok(summary)
    }

    /// Scan then process.
    pub fn run(
        &mut self,
        cancel: &CancellationToken,
        progress: impl FnMut(RefreshProgress<'_>),
    ) -> IngestResult<RefreshSummary> {
        let cursors = self.scan_journal_files()?;
        self.process(cursors, cancel, progress)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
