//! Line parser: turns one journal line into a [`ParseOutcome`].
//!
//! Parsing is pure: no I/O, no shared state between calls. Event names are
//! resolved through an [`EventRegistry`] handed to the parser at
//! construction; unknown names are kept verbatim as [`EventTag::Unknown`].

use crate::event::EventTag;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Event-name table
// ---------------------------------------------------------------------------

static EVENT_NAMES: phf::Map<&'static str, EventTag> = phf::phf_map! {
    "Fileheader" => EventTag::Fileheader,
    "Commander" => EventTag::Commander,
    "NewCommander" => EventTag::NewCommander,
    "LoadGame" => EventTag::LoadGame,
    "Shutdown" => EventTag::Shutdown,
    "Docked" => EventTag::Docked,
    "Undocked" => EventTag::Undocked,
    "DockingRequested" => EventTag::DockingRequested,
    "DockingGranted" => EventTag::DockingGranted,
    "DockingDenied" => EventTag::DockingDenied,
    "FSDJump" => EventTag::FsdJump,
    "FSDTarget" => EventTag::FsdTarget,
    "StartJump" => EventTag::StartJump,
    "Location" => EventTag::Location,
    "CarrierJump" => EventTag::CarrierJump,
    "SupercruiseEntry" => EventTag::SupercruiseEntry,
    "SupercruiseExit" => EventTag::SupercruiseExit,
    "Touchdown" => EventTag::Touchdown,
    "Liftoff" => EventTag::Liftoff,
    "Scan" => EventTag::Scan,
    "FSSDiscoveryScan" => EventTag::FssDiscoveryScan,
    "FSSSignalDiscovered" => EventTag::FssSignalDiscovered,
    "SAASignalsFound" => EventTag::SaaSignalsFound,
    "Died" => EventTag::Died,
    "Music" => EventTag::Music,
    "UnderAttack" => EventTag::UnderAttack,
    "ReservoirReplenished" => EventTag::ReservoirReplenished,
    "ReceiveText" => EventTag::ReceiveText,
};

/// Tags that are surfaced to collaborators but never stored, unless the
/// configuration says otherwise.
pub const DEFAULT_TRANSIENT_TAGS: &[&str] = &["Music", "UnderAttack", "ReservoirReplenished"];

// ---------------------------------------------------------------------------
// EventRegistry
// ---------------------------------------------------------------------------

/// Resolves journal event names to [`EventTag`]s and knows which tags are
/// transient (UI-only).
#[derive(Debug, Clone)]
pub struct EventRegistry {
    transient: HashSet<EventTag>,
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl EventRegistry {
    pub fn standard() -> Self {
        Self::with_transient_tags(DEFAULT_TRANSIENT_TAGS.iter().copied())
    }

    /// Build a registry whose transient set is exactly `names`. Names that are
    /// not in the known table are still honoured as unknown tags.
    pub fn with_transient_tags<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let transient = names
            .into_iter()
            .map(|n| tag_for_name(n.as_ref()))
            .collect();
        Self { transient }
    }

    pub fn resolve(&self, name: &str) -> EventTag {
        tag_for_name(name)
    }

    pub fn is_transient(&self, tag: &EventTag) -> bool {
        self.transient.contains(tag)
    }
}

/// Resolve a journal event name against the static table. Unknown names
/// come back as [`EventTag::Unknown`].
pub fn tag_for_name(name: &str) -> EventTag {
    EVENT_NAMES
        .get(name)
        .cloned()
        .unwrap_or_else(|| EventTag::Unknown(name.to_string()))
}

// ---------------------------------------------------------------------------
// ParseOutcome
// ---------------------------------------------------------------------------

/// A successfully parsed journal line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub tag: EventTag,
    pub timestamp: DateTime<Utc>,
    /// The whole JSON object, `timestamp` and `event` keys included.
    pub payload: Map<String, Value>,
}

/// Why a line could not be turned into an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    InvalidJson(String),
    NotAnObject,
    MissingTimestamp,
    BadTimestamp(String),
    MissingEvent,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedReason::InvalidJson(e) => write!(f, "invalid JSON: {e}"),
            MalformedReason::NotAnObject => write!(f, "line is not a JSON object"),
            MalformedReason::MissingTimestamp => write!(f, "missing timestamp"),
            MalformedReason::BadTimestamp(ts) => write!(f, "unparseable timestamp {ts:?}"),
            MalformedReason::MissingEvent => write!(f, "missing event name"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(ParsedLine),
    /// Blank or whitespace-only line.
    Empty,
    Malformed(MalformedReason),
}

// ---------------------------------------------------------------------------
// LineParser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct LineParser {
    registry: EventRegistry,
}

impl LineParser {
    pub fn new(registry: EventRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Parse one line of text. Never panics, never errors.
    pub fn parse(&self, line: &str) -> ParseOutcome {
        // The first line of a file written by some clients carries a BOM.
        let line = line.trim_start_matches('\u{feff}').trim();
        if line.is_empty() {
            return ParseOutcome::Empty;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(obj)) => self.parse_object(obj),
            Ok(_) => ParseOutcome::Malformed(MalformedReason::NotAnObject),
            Err(e) => ParseOutcome::Malformed(MalformedReason::InvalidJson(e.to_string())),
        }
    }

    /// Parse an already-decoded JSON object.
    pub fn parse_object(&self, payload: Map<String, Value>) -> ParseOutcome {
        let timestamp = match payload.get("timestamp") {
            None | Some(Value::Null) => {
                return ParseOutcome::Malformed(MalformedReason::MissingTimestamp)
            }
            Some(Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
                Ok(t) => t.with_timezone(&Utc),
                Err(_) => {
                    return ParseOutcome::Malformed(MalformedReason::BadTimestamp(s.clone()))
                }
            },
            Some(other) => {
                return ParseOutcome::Malformed(MalformedReason::BadTimestamp(other.to_string()))
            }
        };
        let tag = match payload.get("event").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => self.registry.resolve(name),
            _ => return ParseOutcome::Malformed(MalformedReason::MissingEvent),
        };
        ParseOutcome::Parsed(ParsedLine {
            tag,
            timestamp,
            payload,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
