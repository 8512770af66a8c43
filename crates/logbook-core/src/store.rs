//! Store: SQLite persistence for file cursors, commanders and journal events.
//!
//! The store is the single source of truth for what has been ingested. The
//! one guarantee the ingestion pipeline relies on is [`PersistenceWriter::commit`]:
//! the surviving events of a batch and the new cursor offset land in one
//! transaction, or neither does.

use crate::cursor::{FileCursor, FileKind};
use crate::dedup::{DedupGate, DedupKey, DedupLookup};
use crate::error::{StoreError, StoreResult};
use crate::event::{CommanderId, CursorId, EventTag, JournalEvent};
use crate::parser::tag_for_name;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS commanders (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    fid  TEXT
);

CREATE TABLE IF NOT EXISTS travel_log_units (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    path          TEXT NOT NULL UNIQUE,
    pos           INTEGER NOT NULL DEFAULT 0,
    kind          INTEGER NOT NULL,
    last_write_ms INTEGER,
    commander_id  INTEGER NOT NULL DEFAULT -1
);

CREATE TABLE IF NOT EXISTS journal_entries (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    event_time_ms INTEGER NOT NULL,
    travel_log_id INTEGER NOT NULL,
    commander_id  INTEGER NOT NULL,
    event_type    TEXT NOT NULL,
    event_data    TEXT NOT NULL,
    synced        INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS journal_entries_dedup
    ON journal_entries (commander_id, event_time_ms, travel_log_id, event_type);
CREATE INDEX IF NOT EXISTS journal_entries_tlu
    ON journal_entries (travel_log_id, event_time_ms);
";

const CURSOR_COLUMNS: &str = "id, path, pos, kind, last_write_ms, commander_id";
const EVENT_COLUMNS: &str =
    "id, event_time_ms, travel_log_id, commander_id, event_type, event_data, synced";

/// Commits slower than this are logged; they usually mean a contended disk.
const SLOW_COMMIT: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Durable cursor bookkeeping.
pub trait CursorStore {
    /// Idempotent: the same path always yields the same [`CursorId`].
    fn load_or_create(&mut self, path: &Path) -> StoreResult<FileCursor>;

    /// Register many paths in a single transaction, preserving order.
    fn register_all(&mut self, paths: &[PathBuf]) -> StoreResult<Vec<FileCursor>>;

    fn known_paths(&self) -> StoreResult<HashSet<PathBuf>>;
}

/// Get-or-create commander identities by name.
pub trait CommanderDirectory {
    fn resolve_commander(&mut self, name: &str, fid: Option<&str>) -> StoreResult<CommanderId>;
}

/// Atomic batch commit.
pub trait PersistenceWriter {
    /// Store the events that survive deduplication together with the cursor's
    /// new offset, atomically. Returns the stored events with `seq` assigned.
    fn commit(
        &mut self,
        events: Vec<JournalEvent>,
        cursor: &FileCursor,
    ) -> StoreResult<Vec<JournalEvent>>;
}

/// Everything the ingestion pipeline needs from storage.
pub trait JournalBackend: CursorStore + CommanderDirectory + PersistenceWriter {}

impl<T: CursorStore + CommanderDirectory + PersistenceWriter> JournalBackend for T {}

// ---------------------------------------------------------------------------
// EventQuery
// ---------------------------------------------------------------------------

/// Filter for [`JournalStore::events`]. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub commander: Option<CommanderId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub tags: Vec<EventTag>,
}

// ---------------------------------------------------------------------------
// JournalStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct JournalStore {
    conn: Connection,
    gate: DedupGate,
}

impl JournalStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            tracing::warn!(error = %e, "store: could not enable WAL");
        }
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            gate: DedupGate::new(),
        })
    }

    // -- cursors ------------------------------------------------------------

    pub fn cursor_by_path(&self, path: &Path) -> StoreResult<Option<FileCursor>> {
        cursor_by_path(&self.conn, path)
    }

    pub fn cursors(&self) -> StoreResult<Vec<FileCursor>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {CURSOR_COLUMNS} FROM travel_log_units ORDER BY id ASC"))?;
        let rows = stmt.query_map([], cursor_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Forget a file: its cursor and every event it produced, atomically.
    /// Returns the number of events removed.
    pub fn forget(&mut self, path: &Path) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        let Some(cursor) = cursor_by_path(&tx, path)? else {
            return Ok(0);
        };
        let removed = tx.execute(
            "DELETE FROM journal_entries WHERE travel_log_id = ?1",
            params![cursor.id.0],
        )?;
        tx.execute(
            "DELETE FROM travel_log_units WHERE id = ?1",
            params![cursor.id.0],
        )?;
        tx.commit()?;
        tracing::info!(path = %path.display(), removed, "store: forgot file history");
        Ok(removed)
    }

    // -- events -------------------------------------------------------------

    pub fn event(&self, seq: i64) -> StoreResult<JournalEvent> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM journal_entries WHERE id = ?1"),
                params![seq],
                RawEvent::from_row,
            )
            .optional()?;
        raw.ok_or(StoreError::UnknownEvent(seq))?.into_event()
    }

    pub fn events_for_cursor(&self, cursor: CursorId) -> StoreResult<Vec<JournalEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM journal_entries \
             WHERE travel_log_id = ?1 ORDER BY event_time_ms ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![cursor.0], RawEvent::from_row)?;
        rows.map(|r| r?.into_event()).collect()
    }

    pub fn events(&self, query: &EventQuery) -> StoreResult<Vec<JournalEvent>> {
        let mut conditions: Vec<String> = Vec::new();
        let mut args: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(cmdr) = query.commander {
            args.push(cmdr.0.into());
            conditions.push(format!("commander_id = ?{}", args.len()));
        }
        if let Some(from) = query.from {
            args.push(from.timestamp_millis().into());
            conditions.push(format!("event_time_ms >= ?{}", args.len()));
        }
        if let Some(to) = query.to {
            args.push(to.timestamp_millis().into());
            conditions.push(format!("event_time_ms <= ?{}", args.len()));
        }
        if !query.tags.is_empty() {
            let mut slots = Vec::with_capacity(query.tags.len());
            for tag in &query.tags {
                args.push(tag.as_str().to_string().into());
                slots.push(format!("?{}", args.len()));
            }
            conditions.push(format!("event_type IN ({})", slots.join(", ")));
        }

        let mut sql = format!("SELECT {EVENT_COLUMNS} FROM journal_entries");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY event_time_ms ASC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args), RawEvent::from_row)?;
        rows.map(|r| r?.into_event()).collect()
    }

    pub fn event_count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM journal_entries", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    pub fn commanders(&self) -> StoreResult<Vec<(CommanderId, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM commanders ORDER BY id ASC")?;
        let rows = stmt.query_map([], |r| Ok((CommanderId(r.get(0)?), r.get(1)?)))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    // -- enrichment / sync ----------------------------------------------------

    /// Backfill a star position into a stored event, flagging it as
    /// system-generated.
    pub fn enrich_star_position(&mut self, seq: i64, pos: [f64; 3]) -> StoreResult<JournalEvent> {
        let tx = self.conn.transaction()?;
        let data: Option<String> = tx
            .query_row(
                "SELECT event_data FROM journal_entries WHERE id = ?1",
                params![seq],
                |r| r.get(0),
            )
            .optional()?;
        let data = data.ok_or(StoreError::UnknownEvent(seq))?;
        let mut payload = parse_payload(seq, &data)?;
        payload.insert("StarPos".into(), Value::from(pos.to_vec()));
        payload.insert("StarPosFromEDSM".into(), Value::Bool(true));
        tx.execute(
            "UPDATE journal_entries SET event_data = ?1 WHERE id = ?2",
            params![serde_json::to_string(&payload)?, seq],
        )?;
        tx.commit()?;
        self.event(seq)
    }

    pub fn set_sync_flags(&mut self, seq: i64, flags: i64) -> StoreResult<()> {
        let n = self.conn.execute(
            "UPDATE journal_entries SET synced = ?1 WHERE id = ?2",
            params![flags, seq],
        )?;
        if n == 0 {
            return Err(StoreError::UnknownEvent(seq));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Trait impls
// ---------------------------------------------------------------------------

impl CursorStore for JournalStore {
    fn load_or_create(&mut self, path: &Path) -> StoreResult<FileCursor> {
        load_or_create(&self.conn, path)
    }

    fn register_all(&mut self, paths: &[PathBuf]) -> StoreResult<Vec<FileCursor>> {
        let tx = self.conn.transaction()?;
        let cursors = paths
            .iter()
            .map(|p| load_or_create(&tx, p))
            .collect::<StoreResult<Vec<_>>>()?;
        tx.commit()?;
        Ok(cursors)
    }

    fn known_paths(&self) -> StoreResult<HashSet<PathBuf>> {
        let mut stmt = self.conn.prepare("SELECT path FROM travel_log_units")?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        let mut out = HashSet::new();
        for path in rows {
            out.insert(PathBuf::from(path?));
        }
        Ok(out)
    }
}

impl CommanderDirectory for JournalStore {
    fn resolve_commander(&mut self, name: &str, fid: Option<&str>) -> StoreResult<CommanderId> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM commanders WHERE name = ?1",
                params![name],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            if let Some(fid) = fid {
                self.conn.execute(
                    "UPDATE commanders SET fid = ?1 WHERE id = ?2 AND fid IS NULL",
                    params![fid, id],
                )?;
            }
            return Ok(CommanderId(id));
        }
        self.conn.execute(
            "INSERT INTO commanders (name, fid) VALUES (?1, ?2)",
            params![name, fid],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(commander = name, id, "store: new commander");
        Ok(CommanderId(id))
    }
}

impl PersistenceWriter for JournalStore {
    fn commit(
        &mut self,
        events: Vec<JournalEvent>,
        cursor: &FileCursor,
    ) -> StoreResult<Vec<JournalEvent>> {
        let started = Instant::now();
        let offered = events.len();
        let gate = self.gate;

        let tx = self.conn.transaction()?;
        let survivors = gate.filter_new_entries(events, &SqlLookup(&tx))?;
        let stored = insert_events(&tx, survivors)?;
        update_cursor(&tx, cursor)?;
        tx.commit()?;

        let elapsed = started.elapsed();
        if elapsed >= SLOW_COMMIT {
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                events = stored.len(),
                "store: slow journal commit"
            );
        }
        tracing::debug!(
            cursor = %cursor.id,
            pos = cursor.pos,
            offered,
            stored = stored.len(),
            "store: committed batch"
        );
        Ok(stored)
    }
}

/// Dedup lookups against a connection or an open transaction.
struct SqlLookup<'c>(&'c Connection);

impl DedupLookup for SqlLookup<'_> {
    fn payloads_for(&self, key: &DedupKey) -> StoreResult<Vec<Map<String, Value>>> {
        let mut stmt = self.0.prepare_cached(
            "SELECT id, event_data FROM journal_entries \
             WHERE commander_id = ?1 AND event_time_ms = ?2 \
               AND travel_log_id = ?3 AND event_type = ?4 \
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(
            params![
                key.commander_id.0,
                key.timestamp.timestamp_millis(),
                key.cursor_id.0,
                key.tag.as_str()
            ],
            |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)),
        )?;
        rows.map(|row| {
            let (seq, data) = row?;
            parse_payload(seq, &data)
        })
        .collect()
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

fn cursor_from_row(row: &Row<'_>) -> rusqlite::Result<FileCursor> {
    let pos: i64 = row.get(2)?;
    let last_write: Option<i64> = row.get(4)?;
    Ok(FileCursor {
        id: CursorId(row.get(0)?),
        path: PathBuf::from(row.get::<_, String>(1)?),
        pos: pos.max(0) as u64,
        kind: FileKind::from_bits(row.get(3)?),
        last_write: last_write.and_then(millis_to_utc),
        commander_id: CommanderId(row.get(5)?),
    })
}

fn cursor_by_path(conn: &Connection, path: &Path) -> StoreResult<Option<FileCursor>> {
    Ok(conn
        .query_row(
            &format!("SELECT {CURSOR_COLUMNS} FROM travel_log_units WHERE path = ?1"),
            params![path_key(path)],
            cursor_from_row,
        )
        .optional()?)
}

fn load_or_create(conn: &Connection, path: &Path) -> StoreResult<FileCursor> {
    if let Some(cursor) = cursor_by_path(conn, path)? {
        return Ok(cursor);
    }
    let kind = FileKind::classify(path);
    let last_write = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    conn.execute(
        "INSERT INTO travel_log_units (path, pos, kind, last_write_ms, commander_id) \
         VALUES (?1, 0, ?2, ?3, ?4)",
        params![
            path_key(path),
            kind.to_bits(),
            last_write.map(|t| t.timestamp_millis()),
            CommanderId::UNRESOLVED.0
        ],
    )?;
    let cursor = FileCursor {
        id: CursorId(conn.last_insert_rowid()),
        path: path.to_path_buf(),
        pos: 0,
        kind,
        last_write,
        commander_id: CommanderId::UNRESOLVED,
    };
    tracing::debug!(path = %path.display(), id = %cursor.id, "store: new file cursor");
    Ok(cursor)
}

fn update_cursor(conn: &Connection, cursor: &FileCursor) -> StoreResult<()> {
    let n = conn.execute(
        "UPDATE travel_log_units \
         SET pos = ?1, kind = ?2, last_write_ms = ?3, commander_id = ?4 \
         WHERE id = ?5",
        params![
            cursor.pos as i64,
            cursor.kind.to_bits(),
            cursor.last_write.map(|t| t.timestamp_millis()),
            cursor.commander_id.0,
            cursor.id.0
        ],
    )?;
    if n == 0 {
        return Err(StoreError::UnknownCursor(cursor.id.0));
    }
    Ok(())
}

fn insert_events(tx: &Transaction<'_>, events: Vec<JournalEvent>) -> StoreResult<Vec<JournalEvent>> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO journal_entries \
         (event_time_ms, travel_log_id, commander_id, event_type, event_data, synced) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut stored = Vec::with_capacity(events.len());
    for mut event in events {
        stmt.execute(params![
            event.timestamp.timestamp_millis(),
            event.cursor_id.0,
            event.commander_id.0,
            event.tag.as_str(),
            serde_json::to_string(&event.payload)?,
            event.sync_flags
        ])?;
        event.seq = Some(tx.last_insert_rowid());
        stored.push(event);
    }
    Ok(stored)
}

fn parse_payload(seq: i64, data: &str) -> StoreResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(data)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::PayloadNotObject { seq }),
    }
}

/// Row as read from `journal_entries`, before JSON decoding.
struct RawEvent {
    seq: i64,
    time_ms: i64,
    cursor_id: i64,
    commander_id: i64,
    tag: String,
    data: String,
    synced: i64,
}

impl RawEvent {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            time_ms: row.get(1)?,
            cursor_id: row.get(2)?,
            commander_id: row.get(3)?,
            tag: row.get(4)?,
            data: row.get(5)?,
            synced: row.get(6)?,
        })
    }

    fn into_event(self) -> StoreResult<JournalEvent> {
        let timestamp = millis_to_utc(self.time_ms).ok_or(StoreError::BadTimestamp {
            seq: self.seq,
            millis: self.time_ms,
        })?;
        Ok(JournalEvent {
            seq: Some(self.seq),
            tag: tag_for_name(&self.tag),
            timestamp,
            payload: parse_payload(self.seq, &self.data)?,
            cursor_id: CursorId(self.cursor_id),
            commander_id: CommanderId(self.commander_id),
            sync_flags: self.synced,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
