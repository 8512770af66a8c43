//! Configuration types for logbook.
//!
//! [`Config::load`] reads `~/.config/logbook/config.toml`, creating it with
//! hardcoded defaults if it does not yet exist, and layers an optional
//! explicit file on top. [`Config::defaults`] returns the same defaults
//! without touching the filesystem (useful in tests).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Embedded defaults
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"
[journal]
folder             = "~/Saved Games/Frontier Developments/Elite Dangerous"
file_pattern       = "Journal*.log"
include_subfolders = false
history_floor      = "2014-12-14T00:00:00Z"

[scheduler]
poll_interval_ms        = 1000
idle_ticks_before_rescan = 30

[refresh]
reload_last_n = 0

[database]
path = "~/.local/share/logbook/journal.db"

[events]
transient_tags = ["Music", "UnderAttack", "ReservoirReplenished"]
"#;

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

/// `[journal]` section: where the game writes its logs.
#[derive(Debug, Clone, Deserialize)]
pub struct JournalConfig {
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
    #[serde(default)]
    pub include_subfolders: bool,
    /// Files last written before this instant are ignored.
    #[serde(default = "default_history_floor")]
    pub history_floor: DateTime<Utc>,
}

fn default_folder() -> String { "~/Saved Games/Frontier Developments/Elite Dangerous".to_string() }
fn default_file_pattern() -> String { "Journal*.log".to_string() }
fn default_history_floor() -> DateTime<Utc> { DateTime::<Utc>::UNIX_EPOCH }

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            folder: default_folder(),
            file_pattern: default_file_pattern(),
            include_subfolders: false,
            history_floor: default_history_floor(),
        }
    }
}

impl JournalConfig {
    pub fn folder_path(&self) -> PathBuf {
        expand_home(&self.folder)
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_idle_ticks")]
    pub idle_ticks_before_rescan: u32,
}

fn default_poll_interval_ms() -> u64 { 1000 }
fn default_idle_ticks() -> u32 { 30 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            idle_ticks_before_rescan: default_idle_ticks(),
        }
    }
}

/// `[refresh]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshConfig {
    /// Number of most recent files reparsed from offset 0 on refresh.
    #[serde(default)]
    pub reload_last_n: usize,
}

/// `[database]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

fn default_database_path() -> String { "~/.local/share/logbook/journal.db".to_string() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_database_path() }
    }
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> PathBuf {
        expand_home(&self.path)
    }
}

/// `[events]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_transient_tags")]
    pub transient_tags: Vec<String>,
}

fn default_transient_tags() -> Vec<String> {
    crate::parser::DEFAULT_TRANSIENT_TAGS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { transient_tags: default_transient_tags() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Config {
    /// Load `~/.config/logbook/config.toml` layered on top of the built-in
    /// defaults, then `explicit` on top of that. Creates the user file with
    /// defaults if it does not exist.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = config_path();

        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, DEFAULT_CONFIG.trim_start())?;
        }

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::from(path.as_path()).required(false));
        if let Some(explicit) = explicit {
            builder = builder.add_source(config::File::from(explicit).required(true));
        }

        builder.build()?.try_deserialize().map_err(Into::into)
    }

    /// Return the built-in defaults without touching the filesystem.
    pub fn defaults() -> Self {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .build()
            .expect("built-in default config must be valid TOML")
            .try_deserialize()
            .expect("built-in default config must deserialize correctly")
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
}

fn config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("logbook")
        .join("config.toml")
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => home_dir().join(rest),
        None if raw == "~" => home_dir(),
        None => PathBuf::from(raw),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
