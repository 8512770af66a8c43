#![allow(unused)]
//! Incremental reader integration harness.
//!
//! # What this covers
//!
//! - **Partial lines**: a trailing line without a newline is never consumed;
//!   `new_pos` stops after the last complete line (3 complete lines + 1
//!   partial gives exactly 3 events).
//! - **Malformed lines**: skipped, counted, but consumed, so one bad line
//!   never stalls the rest of the file.
//! - **Idempotent re-read**: reading again with no new writes returns
//!   nothing and leaves `new_pos` unchanged.
//! - **Truncation recovery**: a file shorter than the cursor is reread from
//!   offset 0 without error.
//! - **Property: chunked writes**: for any split of a file into write chunks,
//!   reading after every chunk never leaves `new_pos` off a line boundary and
//!   yields the same events as one read of the whole file. Verified with
//!   proptest.
//!
//! # What this does NOT cover
//!
//! - Scheduling across files (see `scheduler_harness`)
//! - Persistence (see `store_harness`)
//!
//! # Running
//!
//! ```sh
//! cargo test --test reader_harness
//! ```

mod common;
use common::*;

use logbook::core::{CommanderId, FileCursor, JournalStore};
use logbook::feeds::{IncrementalReader, ReadBatch, ReadOutcome};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn read(reader: &IncrementalReader, cursor: &FileCursor, store: &mut JournalStore) -> ReadBatch {
    match reader.read_new_entries(cursor, store).expect("read") {
        ReadOutcome::Batch(batch) => batch,
        ReadOutcome::Missing => panic!("file unexpectedly missing"),
    }
}

fn store() -> JournalStore {
    JournalStore::open_in_memory().expect("in-memory store")
}

// ---------------------------------------------------------------------------
// Partial and malformed lines
// ---------------------------------------------------------------------------

/// Three complete lines and one partial line: exactly three events, and the
/// new offset is the byte just after the third newline.
#[test]
fn three_complete_lines_and_one_partial() {
    let dir = JournalDir::new();
    let complete = as_file(&SESSION[..3]);
    let partial = &SESSION[3][..30];
    let path = dir.write("Journal.01.log", &format!("{complete}{partial}"));

    let batch = read(&IncrementalReader::default(), &detached_cursor(&path, 1, 0), &mut store());
    assert_eq!(batch.events.len(), 3);
    assert!(batch.made_progress);
    assert_eq!(batch.new_pos, complete.len() as u64);
    assert_tags!(batch.events, ["Fileheader", "Commander", "LoadGame"]);
}

/// A malformed line followed by a valid one: one event, offset past both.
#[test]
fn malformed_then_valid_line() {
    let dir = JournalDir::new();
    let content = as_file(&[MALFORMED[0], SESSION[4]]);
    let path = dir.write("Journal.01.log", &content);

    let batch = read(&IncrementalReader::default(), &detached_cursor(&path, 1, 0), &mut store());
    assert_eq!(batch.events.len(), 1);
    assert_eq!(batch.malformed, 1);
    assert_eq!(batch.new_pos, content.len() as u64);
}

/// Only malformed lines: no events, but progress is still made so the
/// cursor moves past them.
#[test]
fn all_malformed_lines_still_make_progress() {
    let dir = JournalDir::new();
    let content = as_file(MALFORMED);
    let path = dir.write("Journal.01.log", &content);

    let batch = read(&IncrementalReader::default(), &detached_cursor(&path, 1, 0), &mut store());
    assert!(batch.events.is_empty());
    assert!(batch.made_progress);
    assert_eq!(batch.malformed, MALFORMED.len());
    assert_eq!(batch.new_pos, content.len() as u64);
}

/// Blank lines and CRLF endings are tolerated.
#[test]
fn blank_lines_and_crlf() {
    let dir = JournalDir::new();
    let content = format!("{}\r\n\r\n   \n{}\r\n", SESSION[0], SESSION[1]);
    let path = dir.write("Journal.01.log", &content);

    let batch = read(&IncrementalReader::default(), &detached_cursor(&path, 1, 0), &mut store());
    assert_tags!(batch.events, ["Fileheader", "Commander"]);
    assert_eq!(batch.malformed, 0);
    assert_eq!(batch.new_pos, content.len() as u64);
}

/// Unknown event names come through as events, payload intact.
#[test]
fn unknown_events_are_kept() {
    let dir = JournalDir::new();
    let path = dir.write("Journal.01.log", &as_file(FUTURE_EVENTS));
    let batch = read(&IncrementalReader::default(), &detached_cursor(&path, 1, 0), &mut store());
    assert_eq!(batch.events.len(), 2);
    assert!(batch.events.iter().all(|e| e.tag.is_unknown()));
    assert_eq!(batch.events[1].payload["Flavour"], "Caustic");
}

// ---------------------------------------------------------------------------
// Re-reads, truncation, missing files
// ---------------------------------------------------------------------------

/// Reading twice without new writes: the second read is empty and does not
/// move the offset.
#[test]
fn reread_without_writes_is_idempotent() {
    let dir = JournalDir::new();
    let path = dir.write("Journal.01.log", &as_file(SESSION));
    let reader = IncrementalReader::default();
    let mut store = store();

    let first = read(&reader, &detached_cursor(&path, 1, 0), &mut store);
    let cursor = first.advance(&detached_cursor(&path, 1, 0));
    let second = read(&reader, &cursor, &mut store);
    assert!(second.events.is_empty());
    assert!(!second.made_progress);
    assert_eq!(second.new_pos, first.new_pos);
}

/// A cursor past the end of the file restarts at 0 and rereads everything.
#[test]
fn truncated_file_is_reread_from_start() {
    let dir = JournalDir::new();
    let path = dir.write("Journal.01.log", &as_file(SESSION));
    let reader = IncrementalReader::default();
    let mut store = store();
    let first = read(&reader, &detached_cursor(&path, 1, 0), &mut store);
    let cursor = first.advance(&detached_cursor(&path, 1, 0));

    // Rotated in place: shorter content at the same path.
    let replacement = as_file(&SESSION[..2]);
    dir.write("Journal.01.log", &replacement);

    let batch = read(&reader, &cursor, &mut store);
    assert!(batch.truncated);
    assert!(batch.made_progress);
    assert_eq!(batch.events.len(), 2);
    assert_eq!(batch.new_pos, replacement.len() as u64);
}

/// Truncation also forgets the commander the old content named.
#[test]
fn truncation_resets_commander() {
    let dir = JournalDir::new();
    let path = dir.write("Journal.01.log", &as_file(&SESSION[..1]));
    let mut cursor = detached_cursor(&path, 1, 10_000);
    cursor.commander_id = CommanderId(7);
    let batch = read(&IncrementalReader::default(), &cursor, &mut store());
    assert_eq!(batch.events[0].commander_id, CommanderId::UNRESOLVED);
}

#[test]
fn missing_file_reports_missing() {
    let dir = JournalDir::new();
    let out = IncrementalReader::default()
        .read_new_entries(&detached_cursor(&dir.path("Journal.404.log"), 1, 0), &mut store())
        .expect("read");
    assert_eq!(out, ReadOutcome::Missing);
}

/// Commander attribution carries across reads through the cursor.
#[test]
fn commander_survives_between_reads() {
    let dir = JournalDir::new();
    let path = dir.write("Journal.01.log", &as_file(&SESSION[..3]));
    let reader = IncrementalReader::default();
    let mut store = store();
    let first = read(&reader, &detached_cursor(&path, 1, 0), &mut store);
    let cursor = first.advance(&detached_cursor(&path, 1, 0));
    assert!(cursor.commander_id.is_resolved());

    dir.append("Journal.01.log", &as_file(&SESSION[4..5]));
    let second = read(&reader, &cursor, &mut store);
    assert_eq!(second.events[0].commander_id, cursor.commander_id);
}

/// Transient events go to their own list.
#[test]
fn transient_events_are_separated() {
    let dir = JournalDir::new();
    let path = dir.write(
        "Journal.01.log",
        &as_file(&[SESSION[0], TRANSIENT[0], SESSION[4], TRANSIENT[1]]),
    );
    let batch = read(&IncrementalReader::default(), &detached_cursor(&path, 1, 0), &mut store());
    assert_tags!(batch.events, ["Fileheader", "Undocked"]);
    assert_tags!(batch.transient, ["Music", "UnderAttack"]);
}

// ---------------------------------------------------------------------------
// Property: chunked writes
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// However the file is split into writes, each read stops on a line
    /// boundary and the concatenated events equal one whole-file read.
    #[test]
    fn chunked_writes_match_single_read(
        cuts in proptest::collection::vec(0usize..4096, 0..12),
        take in 1usize..=SESSION.len(),
    ) {
        let content = as_file(&SESSION[..take]);
        let bytes = content.as_bytes();
        let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c % (bytes.len() + 1)).collect();
        cuts.push(bytes.len());
        cuts.sort_unstable();

        let dir = JournalDir::new();
        let path = dir.write("Journal.01.log", "");
        let reader = IncrementalReader::default();
        let mut store = store();
        let mut cursor = detached_cursor(&path, 1, 0);
        let mut incremental = Vec::new();
        let mut written = 0usize;

        for cut in cuts {
            if cut > written {
                // Chunks may split a multi-byte char; write raw bytes.
                let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
                std::io::Write::write_all(&mut f, &bytes[written..cut]).unwrap();
                written = cut;
            }
            let batch = read(&reader, &cursor, &mut store);
            prop_assert!(batch.new_pos as usize <= written);
            assert_line_boundary!(bytes, batch.new_pos);
            cursor = batch.advance(&cursor);
            incremental.extend(batch.events);
        }

        let whole = read(&reader, &detached_cursor(&path, 1, 0), &mut store);
        prop_assert_eq!(cursor.pos, bytes.len() as u64);
        prop_assert_eq!(tag_names(&incremental), tag_names(&whole.events));
        prop_assert_eq!(payloads(&incremental), payloads(&whole.events));
    }
}
