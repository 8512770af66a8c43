//! Journal event model.
//!
//! An [`EventTag`] is a closed enumeration of the journal event names this
//! crate understands plus an [`EventTag::Unknown`] arm that keeps any other
//! name verbatim, so newer game clients never break older builds.
//!
//! A [`JournalEvent`] is the immutable record produced from one parsed line.
//! [`EventDetails`] decodes a typed view of the payload on demand; the raw
//! payload stays the source of truth.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Stable surrogate identity of a [`crate::cursor::FileCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CursorId(pub i64);

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tlu#{}", self.0)
    }
}

/// Logical owner of a journal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommanderId(pub i64);

impl CommanderId {
    /// Events seen before any `Commander`/`LoadGame` line in their file.
    pub const UNRESOLVED: CommanderId = CommanderId(-1);

    pub fn is_resolved(self) -> bool {
        self.0 >= 0
    }
}

impl Default for CommanderId {
    fn default() -> Self {
        Self::UNRESOLVED
    }
}

impl fmt::Display for CommanderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmdr#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EventTag
// ---------------------------------------------------------------------------

/// Journal event type. Known names map to dedicated variants; everything
/// else is preserved in [`EventTag::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventTag {
    Fileheader,
    Commander,
    NewCommander,
    LoadGame,
    Shutdown,
    Docked,
    Undocked,
    DockingRequested,
    DockingGranted,
    DockingDenied,
    FsdJump,
    FsdTarget,
    StartJump,
    Location,
    CarrierJump,
    SupercruiseEntry,
    SupercruiseExit,
    Touchdown,
    Liftoff,
    Scan,
    FssDiscoveryScan,
    FssSignalDiscovered,
    SaaSignalsFound,
    Died,
    Music,
    UnderAttack,
    ReservoirReplenished,
    ReceiveText,
    Unknown(String),
}

impl EventTag {
    /// The journal `event` name for this tag.
    pub fn as_str(&self) -> &str {
        match self {
            EventTag::Fileheader => "Fileheader",
            EventTag::Commander => "Commander",
            EventTag::NewCommander => "NewCommander",
            EventTag::LoadGame => "LoadGame",
            EventTag::Shutdown => "Shutdown",
            EventTag::Docked => "Docked",
            EventTag::Undocked => "Undocked",
            EventTag::DockingRequested => "DockingRequested",
            EventTag::DockingGranted => "DockingGranted",
            EventTag::DockingDenied => "DockingDenied",
            EventTag::FsdJump => "FSDJump",
            EventTag::FsdTarget => "FSDTarget",
            EventTag::StartJump => "StartJump",
            EventTag::Location => "Location",
            EventTag::CarrierJump => "CarrierJump",
            EventTag::SupercruiseEntry => "SupercruiseEntry",
            EventTag::SupercruiseExit => "SupercruiseExit",
            EventTag::Touchdown => "Touchdown",
            EventTag::Liftoff => "Liftoff",
            EventTag::Scan => "Scan",
            EventTag::FssDiscoveryScan => "FSSDiscoveryScan",
            EventTag::FssSignalDiscovered => "FSSSignalDiscovered",
            EventTag::SaaSignalsFound => "SAASignalsFound",
            EventTag::Died => "Died",
            EventTag::Music => "Music",
            EventTag::UnderAttack => "UnderAttack",
            EventTag::ReservoirReplenished => "ReservoirReplenished",
            EventTag::ReceiveText => "ReceiveText",
            EventTag::Unknown(name) => name,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, EventTag::Unknown(_))
    }

    /// Events that carry the commander name for the rest of the file.
    pub fn names_commander(&self) -> bool {
        matches!(
            self,
            EventTag::Commander | EventTag::LoadGame | EventTag::NewCommander
        )
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JournalEvent
// ---------------------------------------------------------------------------

/// One journal line, parsed and attributed.
///
/// `seq` is `None` while the event is in flight and is assigned by the store
/// on insert. `payload` is the full JSON object of the line, including the
/// `timestamp` and `event` keys, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEvent {
    pub seq: Option<i64>,
    pub tag: EventTag,
    pub timestamp: DateTime<Utc>,
    pub payload: Map<String, Value>,
    pub cursor_id: CursorId,
    pub commander_id: CommanderId,
    /// Upload/acknowledge bits owned by sync collaborators.
    pub sync_flags: i64,
}

impl JournalEvent {
    pub fn details(&self) -> EventDetails {
        EventDetails::decode(&self.tag, &self.payload)
    }
}

/// An event that is handed to collaborators but never persisted
/// (music changes, under-attack warnings and the like).
#[derive(Debug, Clone, PartialEq)]
pub struct TransientEvent {
    pub tag: EventTag,
    pub timestamp: DateTime<Utc>,
    pub payload: Map<String, Value>,
    pub commander_id: CommanderId,
}

// ---------------------------------------------------------------------------
// Field lookup helpers
// ---------------------------------------------------------------------------

// Legacy and current spellings of the same field, newest first.
const FACTION_KEYS: &[&str] = &["StationFaction", "Faction"];
const ALLEGIANCE_KEYS: &[&str] = &["StationAllegiance", "Allegiance"];
const ECONOMY_KEYS: &[&str] = &["StationEconomy", "Economy"];
const GOVERNMENT_KEYS: &[&str] = &["StationGovernment", "Government"];
const SYSTEM_FACTION_KEYS: &[&str] = &["SystemFaction", "Faction"];
const SYSTEM_ALLEGIANCE_KEYS: &[&str] = &["SystemAllegiance", "Allegiance"];
const SYSTEM_ECONOMY_KEYS: &[&str] = &["SystemEconomy", "Economy"];
const BODY_DISTANCE_KEYS: &[&str] = &["DistanceFromArrivalLS", "DistanceFromArrival"];
const COMMANDER_NAME_KEYS: &[&str] = &["Commander", "Name"];

/// First string value found under any of `keys`.
fn multi_str<'a>(payload: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
}

fn str_of(payload: &Map<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn i64_of(payload: &Map<String, Value>, key: &str) -> Option<i64> {
    payload.get(key).and_then(Value::as_i64)
}

fn i32_of(payload: &Map<String, Value>, key: &str) -> Option<i32> {
    i32::try_from(i64_of(payload, key)?).ok()
}

fn f64_of(payload: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_f64))
}

fn star_pos(payload: &Map<String, Value>) -> Option<[f64; 3]> {
    let arr = payload.get("StarPos")?.as_array()?;
    match arr.as_slice() {
        [x, y, z] => Some([x.as_f64()?, y.as_f64()?, z.as_f64()?]),
        _ => None,
    }
}

/// Faction name; post-3.3 journals carry `StationFaction` as an object.
fn station_faction(payload: &Map<String, Value>) -> (Option<String>, Option<String>) {
    match payload.get("StationFaction") {
        Some(Value::Object(obj)) => (
            obj.get("Name").and_then(Value::as_str).map(str::to_string),
            obj.get("FactionState").and_then(Value::as_str).map(str::to_string),
        ),
        _ => (
            multi_str(payload, FACTION_KEYS).map(str::to_string),
            str_of(payload, "FactionState"),
        ),
    }
}

// ---------------------------------------------------------------------------
// EventDetails
// ---------------------------------------------------------------------------

/// One entry of a `Scan` event's `Parents` chain, nearest parent first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    /// `Star`, `Planet`, `Ring` or `Null` (barycentre).
    pub kind: String,
    pub body_id: i32,
}

/// One entry of an `SAASignalsFound` event's `Signals` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodySignal {
    /// Symbol such as `$SAA_SignalType_Biological;`.
    pub kind: String,
    pub kind_localised: Option<String>,
    pub count: u32,
}

/// Typed view of the payload for the events the derived indices use.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDetails {
    Fileheader {
        part: u32,
        game_version: Option<String>,
        build: Option<String>,
    },
    Commander {
        name: String,
        fid: Option<String>,
    },
    Docked {
        station_name: String,
        star_system: String,
        market_id: Option<i64>,
        faction: Option<String>,
        faction_state: Option<String>,
        allegiance: Option<String>,
        economy: Option<String>,
        government: Option<String>,
    },
    Undocked {
        station_name: String,
    },
    Arrival {
        star_system: String,
        system_address: Option<i64>,
        star_pos: Option<[f64; 3]>,
        faction: Option<String>,
        allegiance: Option<String>,
        economy: Option<String>,
    },
    Scan {
        body_name: String,
        body_id: Option<i32>,
        star_system: Option<String>,
        system_address: Option<i64>,
        scan_type: Option<String>,
        distance_ls: Option<f64>,
        star_type: Option<String>,
        planet_class: Option<String>,
        parents: Vec<ParentRef>,
    },
    DiscoveryScan {
        body_count: Option<u32>,
        system_name: Option<String>,
    },
    /// `FSSSignalDiscovered`: one signal source in the current system.
    SignalDiscovered {
        system_address: Option<i64>,
        signal_name: String,
        signal_name_localised: Option<String>,
        signal_type: Option<String>,
        is_station: bool,
    },
    /// `SAASignalsFound`: surface or ring signals after mapping a body.
    SurfaceSignals {
        body_name: String,
        body_id: Option<i32>,
        system_address: Option<i64>,
        signals: Vec<BodySignal>,
        genuses: Vec<String>,
    },
    /// Known or unknown tag with no typed decoding.
    Opaque,
}

impl EventDetails {
    pub fn decode(tag: &EventTag, payload: &Map<String, Value>) -> Self {
        match tag {
            EventTag::Fileheader => EventDetails::Fileheader {
                part: i64_of(payload, "part").unwrap_or(1).max(0) as u32,
                game_version: str_of(payload, "gameversion"),
                build: str_of(payload, "build"),
            },
            EventTag::Commander | EventTag::LoadGame | EventTag::NewCommander => {
                match multi_str(payload, COMMANDER_NAME_KEYS) {
                    Some(name) => EventDetails::Commander {
                        name: name.to_string(),
                        fid: str_of(payload, "FID"),
                    },
                    None => EventDetails::Opaque,
                }
            }
            EventTag::Docked => {
                let (faction, faction_state) = station_faction(payload);
                EventDetails::Docked {
                    station_name: str_of(payload, "StationName").unwrap_or_default(),
                    star_system: str_of(payload, "StarSystem").unwrap_or_default(),
                    market_id: i64_of(payload, "MarketID"),
                    faction,
                    faction_state,
                    allegiance: multi_str(payload, ALLEGIANCE_KEYS).map(str::to_string),
                    economy: multi_str(payload, ECONOMY_KEYS).map(str::to_string),
                    government: multi_str(payload, GOVERNMENT_KEYS).map(str::to_string),
                }
            }
            EventTag::Undocked => EventDetails::Undocked {
                station_name: str_of(payload, "StationName").unwrap_or_default(),
            },
            EventTag::FsdJump | EventTag::Location | EventTag::CarrierJump => {
                let faction = match payload.get("SystemFaction") {
                    Some(Value::Object(obj)) => {
                        obj.get("Name").and_then(Value::as_str).map(str::to_string)
                    }
                    _ => multi_str(payload, SYSTEM_FACTION_KEYS).map(str::to_string),
                };
                EventDetails::Arrival {
                    star_system: str_of(payload, "StarSystem").unwrap_or_default(),
                    system_address: i64_of(payload, "SystemAddress"),
                    star_pos: star_pos(payload),
                    faction,
                    allegiance: multi_str(payload, SYSTEM_ALLEGIANCE_KEYS).map(str::to_string),
                    economy: multi_str(payload, SYSTEM_ECONOMY_KEYS).map(str::to_string),
                }
            }
            EventTag::Scan => EventDetails::Scan {
                body_name: str_of(payload, "BodyName").unwrap_or_default(),
                body_id: i32_of(payload, "BodyID"),
                star_system: str_of(payload, "StarSystem"),
                system_address: i64_of(payload, "SystemAddress"),
                scan_type: str_of(payload, "ScanType"),
                distance_ls: f64_of(payload, BODY_DISTANCE_KEYS),
                star_type: str_of(payload, "StarType"),
                planet_class: str_of(payload, "PlanetClass"),
                parents: parents(payload),
            },
            EventTag::FssDiscoveryScan => EventDetails::DiscoveryScan {
                body_count: i64_of(payload, "BodyCount").map(|v| v.max(0) as u32),
                system_name: str_of(payload, "SystemName"),
            },
            EventTag::FssSignalDiscovered => EventDetails::SignalDiscovered {
                system_address: i64_of(payload, "SystemAddress"),
                signal_name: str_of(payload, "SignalName").unwrap_or_default(),
                signal_name_localised: str_of(payload, "SignalName_Localised"),
                signal_type: str_of(payload, "SignalType"),
                is_station: payload
                    .get("IsStation")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            EventTag::SaaSignalsFound => EventDetails::SurfaceSignals {
                body_name: str_of(payload, "BodyName").unwrap_or_default(),
                body_id: i32_of(payload, "BodyID"),
                system_address: i64_of(payload, "SystemAddress"),
                signals: body_signals(payload),
                genuses: genuses(payload),
            },
            _ => EventDetails::Opaque,
        }
    }
}

fn body_signals(payload: &Map<String, Value>) -> Vec<BodySignal> {
    let Some(arr) = payload.get("Signals").and_then(Value::as_array) else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| {
            Some(BodySignal {
                kind: str_of(obj, "Type")?,
                kind_localised: str_of(obj, "Type_Localised"),
                count: i64_of(obj, "Count")
                    .and_then(|c| u32::try_from(c).ok())
                    .unwrap_or(0),
            })
        })
        .collect()
}

fn genuses(payload: &Map<String, Value>) -> Vec<String> {
    let Some(arr) = payload.get("Genuses").and_then(Value::as_array) else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| str_of(obj, "Genus"))
        .collect()
}

fn parents(payload: &Map<String, Value>) -> Vec<ParentRef> {
    let Some(arr) = payload.get("Parents").and_then(Value::as_array) else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| {
            let (kind, id) = obj.iter().next()?;
            Some(ParentRef {
                kind: kind.clone(),
                body_id: i32::try_from(id.as_i64()?).ok()?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
