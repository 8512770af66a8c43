//! Directory watcher: discovers journal files that need reading.
//!
//! Two discovery paths feed the scheduler:
//!
//! * OS push notifications. The `notify` callback does nothing but push the
//!   changed path onto an unbounded FIFO; duplicates are fine because the
//!   consumer is idempotent.
//! * A fallback enumeration ([`DirectoryWatcher::fallback_scan`]) for the
//!   notifications the OS drops. It surfaces at most one unseen file per
//!   pass.

use crate::error::WatchError;
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use glob::{MatchOptions, Pattern};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub folder: PathBuf,
    /// Glob over file names, e.g. `Journal*.log`.
    pub file_pattern: String,
    pub include_subfolders: bool,
    /// Files last modified before this are ignored.
    pub history_floor: DateTime<Utc>,
}

impl WatchSettings {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            file_pattern: "Journal*.log".to_string(),
            include_subfolders: false,
            history_floor: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl From<&logbook_core::config::JournalConfig> for WatchSettings {
    fn from(cfg: &logbook_core::config::JournalConfig) -> Self {
        Self {
            folder: cfg.folder_path(),
            file_pattern: cfg.file_pattern.clone(),
            include_subfolders: cfg.include_subfolders,
            history_floor: cfg.history_floor,
        }
    }
}

/// A matching file found by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalFile {
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
    pub len: u64,
}

// ---------------------------------------------------------------------------
// DirectoryWatcher
// ---------------------------------------------------------------------------

pub struct DirectoryWatcher {
    settings: WatchSettings,
    pattern: Pattern,
    tx: Sender<PathBuf>,
    rx: Receiver<PathBuf>,
    os_watcher: Option<RecommendedWatcher>,
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("settings", &self.settings)
            .field("queued", &self.rx.len())
            .field("notifications", &self.os_watcher.is_some())
            .finish()
    }
}

impl DirectoryWatcher {
    /// Build a watcher without OS notifications. Paths arrive only through
    /// [`enqueue`](Self::enqueue) and [`fallback_scan`](Self::fallback_scan)
    /// until [`start`](Self::start) is called.
    pub fn new(settings: WatchSettings) -> Result<Self, WatchError> {
        let pattern = Pattern::new(&settings.file_pattern).map_err(|source| WatchError::Pattern {
            pattern: settings.file_pattern.clone(),
            source,
        })?;
        let (tx, rx) = unbounded();
        Ok(Self {
            settings,
            pattern,
            tx,
            rx,
            os_watcher: None,
        })
    }

    pub fn settings(&self) -> &WatchSettings {
        &self.settings
    }

    /// Subscribe to OS notifications for the journal folder.
    pub fn start(&mut self) -> Result<(), WatchError> {
        if self.os_watcher.is_some() {
            return Ok(());
        }
        let tx = self.tx.clone();
        let pattern = self.pattern.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) => {
                    for path in event.paths {
                        if name_matches(&pattern, &path) {
                            let _ = tx.send(path);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "watcher: notification error"),
            },
            notify::Config::default(),
        )?;
        let mode = if self.settings.include_subfolders {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&self.settings.folder, mode)?;
        tracing::info!(folder = %self.settings.folder.display(), "watcher: started");
        self.os_watcher = Some(watcher);
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.os_watcher.take().is_some() {
            tracing::info!(folder = %self.settings.folder.display(), "watcher: stopped");
        }
    }

    /// Queue a candidate path, as an OS notification would.
    pub fn enqueue(&self, path: impl Into<PathBuf>) {
        // The receiver lives as long as self, so the send cannot fail.
        let _ = self.tx.send(path.into());
    }

    /// Pop the oldest queued path.
    pub fn try_next(&self) -> Option<PathBuf> {
        self.rx.try_recv().ok()
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn matches(&self, path: &Path) -> bool {
        name_matches(&self.pattern, path)
    }

    /// Every matching file modified at or after the history floor, oldest
    /// first (ties broken by name).
    pub fn enumerate(&self) -> Result<Vec<JournalFile>, WatchError> {
        let depth = if self.settings.include_subfolders {
            usize::MAX
        } else {
            1
        };
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.settings.folder).max_depth(depth) {
            let entry = match entry {
                Ok(e) => e,
                // The folder itself is unreadable: nothing to scan.
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    tracing::debug!(error = %e, "watcher: skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !name_matches(&self.pattern, entry.path()) {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            let Ok(modified) = meta.modified() else { continue };
            let modified = DateTime::<Utc>::from(modified);
            if modified < self.settings.history_floor {
                continue;
            }
            files.push(JournalFile {
                path: entry.into_path(),
                modified,
                len: meta.len(),
            });
        }
        files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        Ok(files)
    }

    /// The first file, by name, that has no cursor yet.
    pub fn fallback_scan(&self, known: &HashSet<PathBuf>) -> Result<Option<PathBuf>, WatchError> {
        let mut unseen: Vec<PathBuf> = self
            .enumerate()?
            .into_iter()
            .map(|f| f.path)
            .filter(|p| !known.contains(p))
            .collect();
        unseen.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        if let Some(first) = unseen.first() {
            tracing::info!(
                path = %first.display(),
                unseen = unseen.len(),
                "watcher: fallback scan found unseen file"
            );
        }
        Ok(unseen.into_iter().next())
    }
}

fn name_matches(pattern: &Pattern, path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| pattern.matches_with(n, MATCH_OPTIONS))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
