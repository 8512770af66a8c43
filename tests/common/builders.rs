//! Test builders: journal folders, stores and collaborators.
//!
//! These helpers are designed for readability in test assertions, not for
//! production use. They panic on I/O failure rather than returning `Result`.

use logbook::core::{
    CommanderDirectory, CommanderId, CursorStore, EventSink, FileCursor, JournalEvent,
    JournalStore, PersistenceWriter, StoreError, StoreResult, TransientEvent,
};
use logbook::feeds::{DirectoryWatcher, IncrementalReader, IngestionScheduler, SchedulerSettings, WatchSettings};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fs::{File, FileTimes, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, SystemTime};

// ---------------------------------------------------------------------------
// JournalDir
// ---------------------------------------------------------------------------

/// A temporary journal folder.
///
/// # Example
///
/// ```rust
/// let dir = JournalDir::new();
/// let path = dir.write("Journal.01.log", &as_file(SESSION));
/// dir.append("Journal.01.log", "{ ... partial");
/// ```
pub struct JournalDir {
    dir: tempfile::TempDir,
}

impl JournalDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp journal dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Create or replace a file.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, content).expect("write journal file");
        path
    }

    pub fn append(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .expect("open journal file for append");
        f.write_all(content.as_bytes()).expect("append journal file");
        path
    }

    /// Shrink a file to `len` bytes.
    pub fn truncate(&self, name: &str, len: u64) {
        let f = OpenOptions::new()
            .write(true)
            .open(self.path(name))
            .expect("open journal file for truncate");
        f.set_len(len).expect("truncate journal file");
    }

    /// Set a file's mtime to `age` before now.
    pub fn set_age(&self, name: &str, age: Duration) {
        let f = File::options()
            .write(true)
            .open(self.path(name))
            .expect("open journal file for mtime");
        f.set_times(FileTimes::new().set_modified(SystemTime::now() - age))
            .expect("set mtime");
    }

    pub fn len(&self, name: &str) -> u64 {
        std::fs::metadata(self.path(name)).expect("stat journal file").len()
    }

    pub fn settings(&self) -> WatchSettings {
        WatchSettings::new(self.root())
    }

    pub fn watcher(&self) -> DirectoryWatcher {
        DirectoryWatcher::new(self.settings()).expect("build watcher")
    }

    /// A database file next to (not inside) the journal folder's files.
    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("db").join("journal.db")
    }
}

// ---------------------------------------------------------------------------
// Scheduler construction
// ---------------------------------------------------------------------------

pub fn scheduler<S: logbook::core::JournalBackend>(
    dir: &JournalDir,
    store: S,
    idle_ticks_before_rescan: u32,
) -> IngestionScheduler<S> {
    IngestionScheduler::new(
        store,
        dir.watcher(),
        IncrementalReader::default(),
        SchedulerSettings {
            idle_ticks_before_rescan,
        },
    )
}

/// A cursor for `path` at `pos`, outside any store.
pub fn detached_cursor(path: &Path, id: i64, pos: u64) -> FileCursor {
    FileCursor {
        id: logbook::core::CursorId(id),
        path: path.to_path_buf(),
        pos,
        kind: logbook::core::FileKind::classify(path),
        last_write: None,
        commander_id: CommanderId::UNRESOLVED,
    }
}

// ---------------------------------------------------------------------------
// FlakyStore
// ---------------------------------------------------------------------------

/// A [`JournalStore`] whose next `fail_commits` commits are rejected before
/// anything is written, as a crash mid-transaction would leave it.
pub struct FlakyStore {
    pub inner: JournalStore,
    pub fail_commits: usize,
}

impl FlakyStore {
    pub fn new(fail_commits: usize) -> Self {
        Self {
            inner: JournalStore::open_in_memory().expect("in-memory store"),
            fail_commits,
        }
    }
}

impl CursorStore for FlakyStore {
    fn load_or_create(&mut self, path: &Path) -> StoreResult<FileCursor> {
        self.inner.load_or_create(path)
    }

    fn register_all(&mut self, paths: &[PathBuf]) -> StoreResult<Vec<FileCursor>> {
        self.inner.register_all(paths)
    }

    fn known_paths(&self) -> StoreResult<HashSet<PathBuf>> {
        self.inner.known_paths()
    }
}

impl CommanderDirectory for FlakyStore {
    fn resolve_commander(&mut self, name: &str, fid: Option<&str>) -> StoreResult<CommanderId> {
        self.inner.resolve_commander(name, fid)
    }
}

impl PersistenceWriter for FlakyStore {
    fn commit(
        &mut self,
        events: Vec<JournalEvent>,
        cursor: &FileCursor,
    ) -> StoreResult<Vec<JournalEvent>> {
        if self.fail_commits > 0 {
            self.fail_commits -= 1;
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                format!("simulated crash with {} events for {}", events.len(), cursor.id),
            )));
        }
        self.inner.commit(events, cursor)
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// What a [`RecordingSink`] has seen, shared with the test body.
#[derive(Debug, Default)]
pub struct Recorded {
    pub batches: usize,
    pub stored: Vec<JournalEvent>,
    pub transient: Vec<TransientEvent>,
}

/// Sink that records every notification. Keep the returned handle to
/// inspect it after handing the sink to a scheduler.
pub struct RecordingSink(Rc<RefCell<Recorded>>);

impl RecordingSink {
    pub fn new() -> (Box<Self>, Rc<RefCell<Recorded>>) {
        let shared = Rc::new(RefCell::new(Recorded::default()));
        (Box::new(Self(Rc::clone(&shared))), shared)
    }
}

impl EventSink for RecordingSink {
    fn on_new_events(&mut self, stored: &[JournalEvent], transient: &[TransientEvent]) {
        let mut rec = self.0.borrow_mut();
        rec.batches += 1;
        rec.stored.extend_from_slice(stored);
        rec.transient.extend_from_slice(transient);
    }
}
