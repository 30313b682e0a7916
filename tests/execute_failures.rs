//! Executor behaviour under provider failures.

use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::tempdir;

use drive_dedupe::DedupeError;
use drive_dedupe::decisions::{Choice, DecisionStore};
use drive_dedupe::executor::{self, ExecuteOptions, ExecutionLog, Plan, RecordStatus};
use drive_dedupe::filter::PathFilter;
use drive_dedupe::model::{AuthScope, FOLDER_MIME, FileRecord};
use drive_dedupe::scan::run_scan;
use drive_dedupe::store::{MemoryStore, RetryPolicy, StoreError, StoreOp};

fn rec(id: &str, name: &str, parent: &str, fp: Option<&str>) -> FileRecord {
    FileRecord {
        id: id.into(),
        name: name.into(),
        parent_ids: vec![parent.into()],
        fingerprint: fp.map(str::to_string),
        size: 10,
        mime_type: if fp.is_some() { "text/plain".into() } else { FOLDER_MIME.into() },
        modified_time: format!("2024-01-0{}T00:00:00Z", id.len().min(9)),
    }
}

/// Folder `/D` with a kept file `K` and duplicates `X1`, `X2`, `X3`.
fn store() -> MemoryStore {
    MemoryStore::with_records(vec![
        rec("D", "D", "root", None),
        rec("K", "keep.txt", "D", Some("fp")),
        rec("X1", "one.txt", "D", Some("fp")),
        rec("X2", "two.txt", "D", Some("fp")),
        rec("X3", "three.txt", "D", Some("fp")),
    ])
}

fn plan_keep_k(store: &mut MemoryStore, dir: &Path) -> Plan {
    let report = run_scan(
        store,
        dir,
        &RetryPolicy::immediate(1),
        &PathFilter::default(),
        "/_dupes",
        true,
    )
    .unwrap();
    let mut decisions = DecisionStore::open(dir).unwrap();
    decisions
        .record_decision(&report.groups[0], Choice::Keep("K".into()))
        .unwrap();
    executor::plan(&report.groups, &decisions, "/_dupes")
}

fn opts() -> ExecuteOptions {
    ExecuteOptions {
        dry_run: false,
        retry: RetryPolicy::immediate(3),
        batch_size: 100,
        batch_window: Duration::ZERO,
    }
}

fn status_of(report: &executor::ExecutionReport, id: &str) -> RecordStatus {
    report
        .records
        .iter()
        .find(|r| r.file_id == id)
        .map(|r| r.status)
        .expect("record present")
}

#[test]
fn read_only_credential_aborts_before_any_change() {
    let td = tempdir().unwrap();
    let mut s = store();
    let plan = plan_keep_k(&mut s, td.path());
    let mut s = s.with_scope(AuthScope::ReadOnly);

    let mut log = ExecutionLog::open(td.path()).unwrap();
    let err = executor::execute(&mut s, &mut log, &plan, &opts()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DedupeError>(),
        Some(DedupeError::AuthInsufficientScope { .. })
    ));
    assert_eq!(s.mutation_count(), 0);
    assert!(log.records().is_empty());
}

#[test]
fn read_only_credential_may_still_dry_run() {
    let td = tempdir().unwrap();
    let mut s = store();
    let plan = plan_keep_k(&mut s, td.path());
    let mut s = s.with_scope(AuthScope::ReadOnly);

    let mut log = ExecutionLog::open(td.path()).unwrap();
    let mut o = opts();
    o.dry_run = true;
    let out = executor::execute(&mut s, &mut log, &plan, &o).unwrap();
    assert_eq!(out.planned, 3);
    assert_eq!(s.mutation_count(), 0);
}

#[test]
fn scope_revoked_mid_run_aborts_and_logs_the_failed_file() {
    let td = tempdir().unwrap();
    let mut s = store();
    let plan = plan_keep_k(&mut s, td.path());
    let second = plan.records[1].file_id.clone();
    s.inject_failure(
        StoreOp::Move,
        second.clone(),
        StoreError::InsufficientScope("read-only".into()),
    );

    let mut log = ExecutionLog::open(td.path()).unwrap();
    let err = executor::execute(&mut s, &mut log, &plan, &opts()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DedupeError>(),
        Some(DedupeError::AuthInsufficientScope { .. })
    ));
    let statuses: Vec<_> = log.records().iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![RecordStatus::Moved, RecordStatus::Failed]);
    assert_eq!(log.records()[1].file_id, second);
}

#[test]
fn vanished_source_is_skipped_and_the_run_continues() {
    let td = tempdir().unwrap();
    let mut s = store();
    let plan = plan_keep_k(&mut s, td.path());
    s.inject_failure(StoreOp::Move, "X2", StoreError::NotFound("X2".into()));

    let mut log = ExecutionLog::open(td.path()).unwrap();
    let out = executor::execute(&mut s, &mut log, &plan, &opts()).unwrap();
    assert_eq!(status_of(&out, "X2"), RecordStatus::Skipped);
    assert_eq!(out.moved, 2);
    let note = out
        .records
        .iter()
        .find(|r| r.file_id == "X2")
        .and_then(|r| r.note.clone())
        .unwrap();
    assert!(note.contains("no longer exists"), "{note}");
}

#[test]
fn exhausted_transient_errors_fail_only_that_file() {
    let td = tempdir().unwrap();
    let mut s = store();
    let plan = plan_keep_k(&mut s, td.path());
    for _ in 0..3 {
        s.inject_failure(StoreOp::Move, "X1", StoreError::Transient("503".into()));
    }

    let mut log = ExecutionLog::open(td.path()).unwrap();
    let out = executor::execute(&mut s, &mut log, &plan, &opts()).unwrap();
    assert_eq!(status_of(&out, "X1"), RecordStatus::Failed);
    assert_eq!(out.failed, 1);
    assert_eq!(out.moved, 2);
    let failure = out.failures().next().unwrap();
    assert!(
        failure.error.as_deref().unwrap().contains("3 attempt"),
        "{:?}",
        failure.error
    );

    // The failed file is retried by the next run.
    let mut log = ExecutionLog::open(td.path()).unwrap();
    let again = executor::execute(&mut s, &mut log, &plan, &opts()).unwrap();
    assert_eq!(status_of(&again, "X1"), RecordStatus::Moved);
    assert_eq!(again.skipped, 2);
}

#[test]
fn transient_errors_below_the_limit_are_absorbed() {
    let td = tempdir().unwrap();
    let mut s = store();
    let plan = plan_keep_k(&mut s, td.path());
    s.inject_failure(StoreOp::Move, "X3", StoreError::Transient("429".into()));
    s.inject_failure(StoreOp::CreateFolder, "_dupes", StoreError::Transient("500".into()));

    let mut log = ExecutionLog::open(td.path()).unwrap();
    let out = executor::execute(&mut s, &mut log, &plan, &opts()).unwrap();
    assert_eq!(out.moved, 3);
    assert_eq!(out.failed, 0);
}

#[test]
fn conflict_answer_is_retried_with_a_fresh_name() {
    let td = tempdir().unwrap();
    let mut s = store();
    let plan = plan_keep_k(&mut s, td.path());
    s.inject_failure(StoreOp::Move, "X1", StoreError::Conflict("one.txt".into()));

    let mut log = ExecutionLog::open(td.path()).unwrap();
    let out = executor::execute(&mut s, &mut log, &plan, &opts()).unwrap();
    assert_eq!(status_of(&out, "X1"), RecordStatus::Moved);
    assert_eq!(out.failed, 0);
}

#[test]
fn repeated_conflicts_fail_the_file() {
    let td = tempdir().unwrap();
    let mut s = store();
    let plan = plan_keep_k(&mut s, td.path());
    for _ in 0..4 {
        s.inject_failure(StoreOp::Move, "X1", StoreError::Conflict("one.txt".into()));
    }

    let mut log = ExecutionLog::open(td.path()).unwrap();
    let out = executor::execute(&mut s, &mut log, &plan, &opts()).unwrap();
    assert_eq!(status_of(&out, "X1"), RecordStatus::Failed);
    assert_eq!(out.moved, 2);
}

#[test]
fn rename_failure_after_move_is_reported_on_the_moved_record() {
    let td = tempdir().unwrap();
    let mut s = MemoryStore::with_records(vec![
        rec("D", "D", "root", None),
        rec("E", "E", "root", None),
        rec("K", "same.txt", "D", Some("fp")),
        rec("X1", "same.txt", "E", Some("fp")),
        rec("X2", "same.txt", "D", Some("fp")),
    ]);
    // An old copy in X2's destination forces a rename after the move.
    s.insert(rec("Q", "_dupes", "root", None));
    s.insert(rec("QD", "D", "Q", None));
    s.insert(rec("OLD", "same.txt", "QD", Some("zz")));
    let plan = plan_keep_k(&mut s, td.path());
    s.inject_failure(StoreOp::Rename, "X2", StoreError::Other("rename refused".into()));

    let mut log = ExecutionLog::open(td.path()).unwrap();
    let out = executor::execute(&mut s, &mut log, &plan, &opts()).unwrap();
    let x2 = out.records.iter().find(|r| r.file_id == "X2").unwrap();
    assert_eq!(x2.status, RecordStatus::Moved);
    assert!(
        x2.error.as_deref().unwrap().starts_with("moved but not renamed"),
        "{:?}",
        x2.error
    );
    assert_eq!(x2.dest_path, "/_dupes/D/same.txt");
}

#[test]
fn rate_ceiling_spreads_calls_over_windows() {
    let td = tempdir().unwrap();
    let mut s = store();
    let plan = plan_keep_k(&mut s, td.path());

    // Two folder creations plus three moves at two calls per 100ms.
    let o = ExecuteOptions {
        batch_size: 2,
        batch_window: Duration::from_millis(100),
        ..opts()
    };
    let mut log = ExecutionLog::open(td.path()).unwrap();
    let started = Instant::now();
    let out = executor::execute(&mut s, &mut log, &plan, &o).unwrap();
    assert_eq!(out.moved, 3);
    assert!(
        started.elapsed() >= Duration::from_millis(200),
        "five calls at two per window need at least two full pauses"
    );
}
