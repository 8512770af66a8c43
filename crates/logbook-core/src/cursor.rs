//! File cursor: the durable ingestion state of one physical log file.
//!
//! A cursor is created the first time a path is seen and keeps its
//! [`CursorId`] for the lifetime of the file, across process restarts.
//! `pos` is the byte offset up to which every line has been consumed.

use crate::event::{CommanderId, CursorId};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static BETA_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Journal(Alpha|Beta|Gamma)\.").expect("static regex"));
static NETLOG_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^netLog\.").expect("static regex"));

// ---------------------------------------------------------------------------
// FileKind
// ---------------------------------------------------------------------------

/// Line grammar of a log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogFormat {
    /// One JSON object per line.
    Journal,
    /// Legacy fixed-grammar text log.
    NetLog,
}

/// Classification of a log file, derived once from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileKind {
    pub format: LogFormat,
    /// Written by a beta/alpha/gamma game client.
    pub beta: bool,
}

impl FileKind {
    const NETLOG_BITS: i64 = 0x1;
    const JOURNAL_BITS: i64 = 0x3;
    const BETA_MARKER: i64 = 0x8000;

    pub const JOURNAL: FileKind = FileKind {
        format: LogFormat::Journal,
        beta: false,
    };

    pub fn classify(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if NETLOG_PREFIX.is_match(&name) {
            return FileKind {
                format: LogFormat::NetLog,
                beta: false,
            };
        }
        FileKind {
            format: LogFormat::Journal,
            beta: BETA_PREFIX.is_match(&name),
        }
    }

    /// Bitfield persisted in the cursor table.
    pub fn to_bits(self) -> i64 {
        let base = match self.format {
            LogFormat::Journal => Self::JOURNAL_BITS,
            LogFormat::NetLog => Self::NETLOG_BITS,
        };
        if self.beta {
            base | Self::BETA_MARKER
        } else {
            base
        }
    }

    pub fn from_bits(bits: i64) -> Self {
        let format = if bits & Self::JOURNAL_BITS == Self::JOURNAL_BITS {
            LogFormat::Journal
        } else {
            LogFormat::NetLog
        };
        FileKind {
            format,
            beta: bits & Self::BETA_MARKER != 0,
        }
    }
}

// ---------------------------------------------------------------------------
// FileCursor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FileCursor {
    pub id: CursorId,
    pub path: PathBuf,
    /// Bytes fully consumed. Never past the end of the last complete line.
    pub pos: u64,
    pub kind: FileKind,
    /// mtime at last observation.
    pub last_write: Option<DateTime<Utc>>,
    /// Commander named by the most recent commander event in this file.
    pub commander_id: CommanderId,
}

impl FileCursor {
    /// True once `pos` has caught up with `len` bytes on disk.
    pub fn is_drained(&self, len: u64) -> bool {
        self.pos >= len
    }

    /// A cursor whose stored offset is beyond the file's length is stale
    /// (the file was truncated or rotated in place).
    pub fn is_stale(&self, len: u64) -> bool {
        self.pos > len
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
