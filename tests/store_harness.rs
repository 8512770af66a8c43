#![allow(unused)]
//! Store integration harness.
//!
//! # What this covers
//!
//! - **Cursor durability**: a cursor's id and offset survive closing and
//!   reopening the database; the same path always maps to the same id.
//! - **Atomic commit**: events and the cursor offset land together; a
//!   rejected commit leaves neither behind.
//! - **Bulk registration**: many paths registered in one call keep their
//!   order and are idempotent.
//! - **Forget history**: removing a file drops its cursor and its events and
//!   nothing else.
//! - **Enrichment and sync flags**: backfilled star positions and sync bits
//!   are written in place.
//! - **Queries**: by cursor, by commander, by time range and tag.
//!
//! # What this does NOT cover
//!
//! - Concurrent writers (the pipeline is single-threaded by design)
//! - Schema migrations between versions
//!
//! # Running
//!
//! ```sh
//! cargo test --test store_harness
//! ```

mod common;
use common::*;

use logbook::core::{
    CommanderDirectory, CursorStore, EventQuery, EventTag, JournalStore, PersistenceWriter,
    StoreError,
};
use logbook::feeds::{IncrementalReader, ReadOutcome};
use pretty_assertions::assert_eq;
use std::path::PathBuf;

/// Read a whole file through the reader and commit it.
fn ingest(store: &mut JournalStore, path: &std::path::Path) -> usize {
    let cursor = store.load_or_create(path).unwrap();
    let ReadOutcome::Batch(batch) = IncrementalReader::default()
        .read_new_entries(&cursor, store)
        .unwrap()
    else {
        panic!("file missing");
    };
    let next = batch.advance(&cursor);
    store.commit(batch.events, &next).unwrap().len()
}

// ---------------------------------------------------------------------------
// Cursor durability
// ---------------------------------------------------------------------------

#[test]
fn cursor_survives_reopen() {
    let dir = JournalDir::new();
    let path = dir.write("Journal.01.log", &as_file(SESSION));
    let db = dir.db_path();

    let (id, pos) = {
        let mut store = JournalStore::open(&db).unwrap();
        ingest(&mut store, &path);
        let c = store.cursor_by_path(&path).unwrap().unwrap();
        (c.id, c.pos)
    };
    assert_eq!(pos, dir.len("Journal.01.log"));

    let mut store = JournalStore::open(&db).unwrap();
    let again = store.load_or_create(&path).unwrap();
    assert_eq!(again.id, id);
    assert_eq!(again.pos, pos);
    assert!(again.commander_id.is_resolved());
    assert_eq!(store.event_count().unwrap(), SESSION.len() as u64);
}

#[test]
fn register_all_is_ordered_and_idempotent() {
    let mut store = JournalStore::open_in_memory().unwrap();
    let paths: Vec<PathBuf> = (1..=5)
        .map(|i| PathBuf::from(format!("/j/Journal.0{i}.log")))
        .collect();
    let first = store.register_all(&paths).unwrap();
    let second = store.register_all(&paths).unwrap();
    assert_eq!(first, second);
    let got: Vec<&PathBuf> = first.iter().map(|c| &c.path).collect();
    assert_eq!(got, paths.iter().collect::<Vec<_>>());
    assert_eq!(store.known_paths().unwrap().len(), 5);
}

#[test]
fn file_kind_is_persisted() {
    let mut store = JournalStore::open_in_memory().unwrap();
    let beta = store
        .load_or_create(std::path::Path::new("/j/JournalBeta.2024-01-15T100000.01.log"))
        .unwrap();
    assert!(beta.kind.beta);
    let reloaded = store.cursor_by_path(&beta.path).unwrap().unwrap();
    assert_eq!(reloaded.kind, beta.kind);
}

// ---------------------------------------------------------------------------
// Atomic commit
// ---------------------------------------------------------------------------

/// A commit that fails inside the transaction leaves neither events nor the
/// new offset behind.
#[test]
fn failed_commit_writes_nothing() {
    let dir = JournalDir::new();
    let path = dir.write("Journal.01.log", &as_file(SESSION));
    let mut store = JournalStore::open(&dir.db_path()).unwrap();
    let cursor = store.load_or_create(&path).unwrap();
    let ReadOutcome::Batch(batch) = IncrementalReader::default()
        .read_new_entries(&cursor, &mut store)
        .unwrap()
    else {
        panic!("file missing");
    };

    // A cursor id the store has never issued fails the final UPDATE, after
    // the inserts already ran inside the transaction.
    let mut bogus = batch.advance(&cursor);
    bogus.id = logbook::core::CursorId(9_999);
    let err = store.commit(batch.events.clone(), &bogus).unwrap_err();
    assert!(matches!(err, StoreError::UnknownCursor(9_999)));
    assert_eq!(store.event_count().unwrap(), 0);
    assert_eq!(store.cursor_by_path(&path).unwrap().unwrap().pos, 0);

    // The same batch commits cleanly against the real cursor.
    let next = batch.advance(&cursor);
    let stored = store.commit(batch.events, &next).unwrap();
    assert_eq!(stored.len(), SESSION.len());
    assert_seq_increasing!(stored);
}

#[test]
fn commit_with_no_events_still_moves_cursor() {
    let dir = JournalDir::new();
    let path = dir.write("Journal.01.log", &as_file(MALFORMED));
    let mut store = JournalStore::open_in_memory().unwrap();
    let cursor = store.load_or_create(&path).unwrap();
    let ReadOutcome::Batch(batch) = IncrementalReader::default()
        .read_new_entries(&cursor, &mut store)
        .unwrap()
    else {
        panic!("file missing");
    };
    assert!(batch.events.is_empty());
    store.commit(batch.events.clone(), &batch.advance(&cursor)).unwrap();
    assert_eq!(
        store.cursor_by_path(&path).unwrap().unwrap().pos,
        dir.len("Journal.01.log")
    );
}

// ---------------------------------------------------------------------------
// Forget history
// ---------------------------------------------------------------------------

#[test]
fn forget_removes_only_that_file() {
    let dir = JournalDir::new();
    let a = dir.write("Journal.01.log", &as_file(&SESSION[..4]));
    let b = dir.write("Journal.02.log", &as_file(&SESSION[4..]));
    let mut store = JournalStore::open_in_memory().unwrap();
    ingest(&mut store, &a);
    ingest(&mut store, &b);

    let removed = store.forget(&a).unwrap();
    assert_eq!(removed, 4);
    assert!(store.cursor_by_path(&a).unwrap().is_none());
    assert!(store.cursor_by_path(&b).unwrap().is_some());
    assert_eq!(store.event_count().unwrap(), (SESSION.len() - 4) as u64);
    assert_eq!(store.forget(&a).unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Enrichment, sync flags, queries
// ---------------------------------------------------------------------------

#[test]
fn enrichment_and_sync_flags() {
    let dir = JournalDir::new();
    let path = dir.write("Journal.01.log", &as_file(SESSION));
    let mut store = JournalStore::open_in_memory().unwrap();
    ingest(&mut store, &path);

    let jump = store
        .events(&EventQuery {
            tags: vec![EventTag::FsdJump],
            ..Default::default()
        })
        .unwrap()
        .remove(0);
    let seq = jump.seq.unwrap();
    let enriched = store.enrich_star_position(seq, [1.0, 2.0, 3.0]).unwrap();
    assert_eq!(enriched.payload["StarPosFromEDSM"], true);
    assert_eq!(enriched.payload["StarPos"], serde_json::json!([1.0, 2.0, 3.0]));

    store.set_sync_flags(seq, 0b101).unwrap();
    assert_eq!(store.event(seq).unwrap().sync_flags, 0b101);
    assert!(matches!(
        store.set_sync_flags(123_456, 1),
        Err(StoreError::UnknownEvent(123_456))
    ));
}

#[test]
fn queries_by_cursor_commander_and_range() {
    let dir = JournalDir::new();
    let path = dir.write("Journal.01.log", &as_file(SESSION));
    let mut store = JournalStore::open_in_memory().unwrap();
    ingest(&mut store, &path);
    let cursor = store.cursor_by_path(&path).unwrap().unwrap();

    let all = store.events_for_cursor(cursor.id).unwrap();
    assert_eq!(all.len(), SESSION.len());
    assert_seq_increasing!(all);

    let cmdr = store.resolve_commander("Jameson", None).unwrap();
    let owned = store
        .events(&EventQuery {
            commander: Some(cmdr),
            ..Default::default()
        })
        .unwrap();
    // Only the Fileheader precedes the first commander event.
    assert_eq!(owned.len(), SESSION.len() - 1);

    let window = store
        .events(&EventQuery {
            from: Some("2024-01-15T10:05:00Z".parse().unwrap()),
            to: Some("2024-01-15T10:07:00Z".parse().unwrap()),
            ..Default::default()
        })
        .unwrap();
    assert_tags!(window, ["FSDJump", "FSSDiscoveryScan", "Scan"]);
}
