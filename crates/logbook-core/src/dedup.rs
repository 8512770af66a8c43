//! Deduplication gate.
//!
//! The same journal content can arrive twice: once through live tailing and
//! again through a later full reparse. Timestamp and tag alone collide for
//! genuinely distinct events (two docking requests in the same second), so a
//! candidate is only dropped when an already-stored event with the same
//! [`DedupKey`] has a structurally equal payload once system-generated keys
//! are stripped from both sides.

use crate::error::StoreResult;
use crate::event::{CommanderId, CursorId, EventTag, JournalEvent};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Keys added after the fact by enrichment, never written by the game.
const GENERATED_KEYS: &[&str] = &["StarPosFromEDSM"];
const GENERATED_PREFIX: &str = "EDD";

/// Lookup key for duplicate candidates. Not unique: several stored events
/// may share it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub commander_id: CommanderId,
    pub timestamp: DateTime<Utc>,
    pub cursor_id: CursorId,
    pub tag: EventTag,
}

impl DedupKey {
    pub fn of(event: &JournalEvent) -> Self {
        Self {
            commander_id: event.commander_id,
            timestamp: event.timestamp,
            cursor_id: event.cursor_id,
            tag: event.tag.clone(),
        }
    }
}

/// Source of already-persisted payloads for a key, ordered by insertion id
/// ascending.
pub trait DedupLookup {
    fn payloads_for(&self, key: &DedupKey) -> StoreResult<Vec<Map<String, Value>>>;
}

pub fn is_generated_key(key: &str) -> bool {
    key.starts_with(GENERATED_PREFIX) || GENERATED_KEYS.contains(&key)
}

/// Copy of `payload` without system-generated keys.
pub fn normalize(payload: &Map<String, Value>) -> Map<String, Value> {
    payload
        .iter()
        .filter(|(k, _)| !is_generated_key(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Structural equality after normalisation. Key order is irrelevant.
pub fn same_entry(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    normalize(a) == normalize(b)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DedupGate;

impl DedupGate {
    pub fn new() -> Self {
        Self
    }

    /// Keep the candidates that have no structurally equal stored twin.
    ///
    /// Candidates are only compared against storage as it was before this
    /// batch, so two identical lines in one batch are both kept.
    pub fn filter_new_entries(
        &self,
        candidates: Vec<JournalEvent>,
        lookup: &impl DedupLookup,
    ) -> StoreResult<Vec<JournalEvent>> {
        let mut kept = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let key = DedupKey::of(&candidate);
            let wanted = normalize(&candidate.payload);
            let existing = lookup.payloads_for(&key)?;
            if existing.iter().any(|stored| normalize(stored) == wanted) {
                tracing::debug!(
                    tag = %candidate.tag,
                    ts = %candidate.timestamp,
                    cursor = %candidate.cursor_id,
                    "dedup: dropping duplicate"
                );
                continue;
            }
            kept.push(candidate);
        }
        Ok(kept)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
