//! An interrupt stops execution between files.
//! Lives in its own test binary: the shutdown flag is process-wide and never resets.

use std::time::Duration;
use tempfile::tempdir;

use drive_dedupe::decisions::{Choice, DecisionStore};
use drive_dedupe::executor::{self, ExecuteOptions, ExecutionLog};
use drive_dedupe::filter::PathFilter;
use drive_dedupe::listing::ListingCache;
use drive_dedupe::model::FileRecord;
use drive_dedupe::scan::scan_listing;
use drive_dedupe::shutdown;
use drive_dedupe::store::{MemoryStore, RetryPolicy};

fn file(id: &str, modified: &str) -> FileRecord {
    FileRecord {
        id: id.into(),
        name: format!("{id}.bin"),
        parent_ids: vec!["root".into()],
        fingerprint: Some("same".into()),
        size: 1,
        mime_type: "application/octet-stream".into(),
        modified_time: modified.into(),
    }
}

#[test]
fn interrupted_run_stops_before_the_next_file() {
    let td = tempdir().unwrap();
    let records = vec![
        file("a", "2024-01-01T00:00:00Z"),
        file("b", "2024-01-02T00:00:00Z"),
        file("c", "2024-01-03T00:00:00Z"),
    ];
    let listing = ListingCache::from_records(records.clone());
    let report = scan_listing(&listing, "root", &PathFilter::default(), "/_dupes");
    let mut decisions = DecisionStore::open(td.path()).unwrap();
    decisions
        .record_decision(&report.groups[0], Choice::Keep("a".into()))
        .unwrap();
    let plan = executor::plan(&report.groups, &decisions, "/_dupes");
    assert_eq!(plan.records.len(), 2);

    let mut store = MemoryStore::with_records(records);
    let mut log = ExecutionLog::open(td.path()).unwrap();
    let opts = ExecuteOptions {
        dry_run: false,
        retry: RetryPolicy::immediate(1),
        batch_size: 10,
        batch_window: Duration::ZERO,
    };

    shutdown::request();
    let out = executor::execute(&mut store, &mut log, &plan, &opts).unwrap();
    assert!(out.interrupted);
    assert!(out.records.is_empty());
    assert_eq!(store.mutation_count(), 0);
    assert!(log.records().is_empty());
}
