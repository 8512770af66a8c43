//! Incremental file reader.
//!
//! Reads the lines appended to a journal file since its cursor's offset.
//! Only complete, newline-terminated lines are consumed: a trailing partial
//! line is left on disk for the next read, so `new_pos` always lands just
//! after a `\n`. Reads are bounded by the length observed when the file was
//! opened, which keeps `new_pos` within the file even while the game is
//! still writing.
//!
//! The reader never writes anything. It returns a [`ReadBatch`] and the
//! caller decides whether to commit it.

use crate::error::{IngestResult, ReadError};
use chrono::{DateTime, Utc};
use logbook_core::event::{CommanderId, EventDetails, JournalEvent, TransientEvent};
use logbook_core::parser::{LineParser, ParseOutcome, ParsedLine};
use logbook_core::{CommanderDirectory, FileCursor};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom};

// ---------------------------------------------------------------------------
// ReadBatch
// ---------------------------------------------------------------------------

/// Result of one incremental read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadBatch {
    /// Events to persist, in file order.
    pub events: Vec<JournalEvent>,
    /// UI-only events, never persisted.
    pub transient: Vec<TransientEvent>,
    /// Offset just past the last complete line consumed.
    pub new_pos: u64,
    /// At least one complete line was consumed, or the cursor was reset.
    /// A batch with progress but no events still has to be committed.
    pub made_progress: bool,
    /// The cursor was past the end of the file and the read restarted at 0.
    pub truncated: bool,
    /// Lines skipped because they could not be parsed.
    pub malformed: usize,
    /// Commander attribution in effect after the last consumed line.
    pub commander_id: CommanderId,
    /// File length when the read started.
    pub file_len: u64,
    pub last_write: Option<DateTime<Utc>>,
}

impl ReadBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.transient.is_empty()
    }

    /// The cursor as it will be once this batch is committed.
    pub fn advance(&self, cursor: &FileCursor) -> FileCursor {
        FileCursor {
            pos: self.new_pos,
            last_write: self.last_write.or(cursor.last_write),
            commander_id: self.commander_id,
            ..cursor.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Batch(ReadBatch),
    /// The file no longer exists.
    Missing,
}

// ---------------------------------------------------------------------------
// IncrementalReader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct IncrementalReader {
    parser: LineParser,
}

impl IncrementalReader {
    pub fn new(parser: LineParser) -> Self {
        Self { parser }
    }

    pub fn parser(&self) -> &LineParser {
        &self.parser
    }

    /// Read every complete line appended since `cursor.pos`.
    ///
    /// Commander events resolve their commander through `commanders`; this
    /// is the only write the reader can cause.
    pub fn read_new_entries(
        &self,
        cursor: &FileCursor,
        commanders: &mut dyn CommanderDirectory,
    ) -> IngestResult<ReadOutcome> {
        let path = &cursor.path;
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ReadOutcome::Missing),
            Err(e) => return Err(ReadError::new(path, e).into()),
        };
        let meta = file.metadata().map_err(|e| ReadError::new(path, e))?;
        let len = meta.len();
        let last_write = meta.modified().ok().map(DateTime::<Utc>::from);

        let mut batch = ReadBatch {
            file_len: len,
            last_write,
            commander_id: cursor.commander_id,
            ..Default::default()
        };

        let start = if cursor.is_stale(len) {
            tracing::warn!(
                path = %path.display(),
                pos = cursor.pos,
                len,
                "reader: file shrank below cursor, rereading from start"
            );
            batch.truncated = true;
            batch.made_progress = true;
            batch.commander_id = CommanderId::UNRESOLVED;
            0
        } else {
            cursor.pos
        };
        batch.new_pos = start;
        if start == len {
            return Ok(ReadOutcome::Batch(batch));
        }

        file.seek(SeekFrom::Start(start))
            .map_err(|e| ReadError::new(path, e))?;
        let mut lines = BufReader::new(file.take(len - start));
        let mut buf = Vec::with_capacity(4096);

        loop {
            buf.clear();
            let n = lines
                .read_until(b'\n', &mut buf)
                .map_err(|e| ReadError::new(path, e))?;
            if n == 0 || buf.last() != Some(&b'\n') {
                // EOF, or a line the game has not finished writing.
                break;
            }
            let line_start = batch.new_pos;
            batch.new_pos += n as u64;
            batch.made_progress = true;

            let text = String::from_utf8_lossy(&buf);
            match self.parser.parse(&text) {
                ParseOutcome::Parsed(parsed) => self.accept(cursor, parsed, &mut batch, commanders)?,
                ParseOutcome::Empty => {}
                ParseOutcome::Malformed(reason) => {
                    batch.malformed += 1;
                    tracing::warn!(
                        path = %path.display(),
                        offset = line_start,
                        %reason,
                        "reader: skipping malformed line"
                    );
                }
            }
        }

        tracing::debug!(
            path = %path.display(),
            from = start,
            to = batch.new_pos,
            events = batch.events.len(),
            transient = batch.transient.len(),
            "reader: read new entries"
        );
        Ok(ReadOutcome::Batch(batch))
    }

    fn accept(
        &self,
        cursor: &FileCursor,
        parsed: ParsedLine,
        batch: &mut ReadBatch,
        commanders: &mut dyn CommanderDirectory,
    ) -> IngestResult<()> {
        if parsed.tag.names_commander() {
            if let EventDetails::Commander { name, fid } =
                EventDetails::decode(&parsed.tag, &parsed.payload)
            {
                batch.commander_id = commanders.resolve_commander(&name, fid.as_deref())?;
            }
        }

        if self.parser.registry().is_transient(&parsed.tag) {
            batch.transient.push(TransientEvent {
                tag: parsed.tag,
                timestamp: parsed.timestamp,
                payload: parsed.payload,
                commander_id: batch.commander_id,
            });
            return Ok(());
        }

        batch.events.push(JournalEvent {
            seq: None,
            tag: parsed.tag,
            timestamp: parsed.timestamp,
            payload: parsed.payload,
            cursor_id: cursor.id,
            commander_id: batch.commander_id,
            sync_flags: 0,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
