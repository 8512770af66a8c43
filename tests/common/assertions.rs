//! Domain-specific assertion macros for logbook harnesses.
//!
//! These wrap `pretty_assertions` and add context-rich failure messages that
//! make it clear which ingestion invariant was violated.

use logbook::core::{EventTag, JournalEvent};

// ---------------------------------------------------------------------------
// Cursor assertions
// ---------------------------------------------------------------------------

/// Assert that `pos` sits at a line boundary of `content`: either 0 or just
/// after a `\n`.
///
/// ```rust
/// assert_line_boundary!(content, batch.new_pos);
/// ```
#[macro_export]
macro_rules! assert_line_boundary {
    ($content:expr, $pos:expr) => {{
        let content: &[u8] = AsRef::<[u8]>::as_ref(&$content);
        let pos = $pos as usize;
        if pos > content.len() {
            panic!(
                "assert_line_boundary! failed: pos {} is past the end ({} bytes)",
                pos,
                content.len()
            );
        }
        if pos != 0 && content[pos - 1] != b'\n' {
            panic!(
                "assert_line_boundary! failed: byte before pos {} is {:?}, not a newline",
                pos,
                content[pos - 1] as char
            );
        }
    }};
}

// ---------------------------------------------------------------------------
// Event assertions
// ---------------------------------------------------------------------------

/// Assert the sequence of event names.
///
/// ```rust
/// assert_tags!(events, ["Fileheader", "Commander"]);
/// ```
#[macro_export]
macro_rules! assert_tags {
    ($events:expr, $expected:expr) => {{
        let actual: Vec<String> = $events.iter().map(|e| e.tag.as_str().to_string()).collect();
        let expected: Vec<String> = $expected.iter().map(|s| s.to_string()).collect();
        pretty_assertions::assert_eq!(actual, expected, "assert_tags! failed");
    }};
}

/// Assert that stored events carry strictly increasing `seq` ids.
#[macro_export]
macro_rules! assert_seq_increasing {
    ($events:expr) => {{
        let seqs: Vec<i64> = $events
            .iter()
            .map(|e| e.seq.expect("stored event without seq"))
            .collect();
        for pair in seqs.windows(2) {
            if pair[0] >= pair[1] {
                panic!("assert_seq_increasing! failed: {:?}", seqs);
            }
        }
    }};
}

/// Event names in order, for comparing two ingestion runs.
pub fn tag_names(events: &[JournalEvent]) -> Vec<String> {
    events.iter().map(|e| e.tag.as_str().to_string()).collect()
}

/// Payloads in order, for comparing two ingestion runs.
pub fn payloads(events: &[JournalEvent]) -> Vec<serde_json::Map<String, serde_json::Value>> {
    events.iter().map(|e| e.payload.clone()).collect()
}

pub fn count_tag(events: &[JournalEvent], tag: &EventTag) -> usize {
    events.iter().filter(|e| &e.tag == tag).count()
}
