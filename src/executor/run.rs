//! Performing a plan against the store.
//!
//! Per planned record:
//! - a file already moved by an earlier real run is skipped ("already executed");
//! - the destination folder chain is looked up, and created on demand unless
//!   this is a dry run;
//! - the final name is picked against the folder's current children plus the
//!   names claimed earlier in the run, so dry runs and real runs agree;
//! - the file is reparented, then renamed if its name was disambiguated.
//!
//! Only an insufficient-scope error ends the run early. Every other failure
//! is recorded on the file and the loop moves on.

use anyhow::Result;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::folders::FolderCache;
use super::journal::{ExecutionLog, ExecutionRecord, RecordStatus};
use super::naming;
use super::plan::Plan;
use crate::errors::DedupeError;
use crate::resolve::{join, segments, split_parent};
use crate::shutdown;
use crate::store::{DriveStore, RetryPolicy, StoreError};

/// Conflict answers tolerated per file before it is marked failed.
const MAX_CONFLICT_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub dry_run: bool,
    pub retry: RetryPolicy,
    /// Mutating calls allowed per `batch_window`.
    pub batch_size: usize,
    pub batch_window: Duration,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            retry: RetryPolicy::default(),
            batch_size: 100,
            batch_window: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    pub run_id: String,
    pub dry_run: bool,
    pub moved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub planned: usize,
    pub interrupted: bool,
    pub records: Vec<ExecutionRecord>,
}

impl ExecutionReport {
    fn new(run_id: &str, dry_run: bool) -> Self {
        Self {
            run_id: run_id.to_string(),
            dry_run,
            ..Self::default()
        }
    }

    fn push(&mut self, record: ExecutionRecord) {
        match record.status {
            RecordStatus::Moved => self.moved += 1,
            RecordStatus::Skipped => self.skipped += 1,
            RecordStatus::Failed => self.failed += 1,
            RecordStatus::Planned => self.planned += 1,
        }
        self.records.push(record);
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records
            .iter()
            .filter(|r| r.status == RecordStatus::Failed)
    }
}

/// Fixed-window ceiling on mutating calls.
#[derive(Debug)]
struct Throttle {
    limit: usize,
    window: Duration,
    started: Instant,
    calls: usize,
}

impl Throttle {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            started: Instant::now(),
            calls: 0,
        }
    }

    fn wait(&mut self) {
        if self.limit == 0 || self.window.is_zero() {
            return;
        }
        let elapsed = self.started.elapsed();
        if elapsed >= self.window {
            self.started = Instant::now();
            self.calls = 0;
        } else if self.calls >= self.limit {
            let pause = self.window - elapsed;
            debug!(pause_ms = pause.as_millis() as u64, limit = self.limit, "Rate ceiling reached; pausing");
            std::thread::sleep(pause);
            self.started = Instant::now();
            self.calls = 0;
        }
        self.calls += 1;
    }
}

struct Executor<'a, S: DriveStore + ?Sized> {
    store: &'a mut S,
    opts: &'a ExecuteOptions,
    folders: FolderCache,
    throttle: Throttle,
}

/// Execute `plan`, appending every outcome to `log` as it happens.
///
/// A real run first checks that the credential may mutate; a read-only
/// credential fails the whole run with `AuthInsufficientScope` before any
/// change is made.
pub fn execute<S: DriveStore + ?Sized>(
    store: &mut S,
    log: &mut ExecutionLog,
    plan: &Plan,
    opts: &ExecuteOptions,
) -> Result<ExecutionReport> {
    if !opts.dry_run {
        let scope = opts
            .retry
            .run("auth_scope", || store.auth_scope())
            .map_err(DedupeError::from)?;
        if !scope.can_move() {
            error!(scope = %scope, "Credential cannot move files; aborting before any change");
            return Err(DedupeError::AuthInsufficientScope {
                scope: scope.to_string(),
            }
            .into());
        }
    }

    let root_id = store.root_id().to_string();
    let mut exec = Executor {
        store,
        opts,
        folders: FolderCache::new(&root_id),
        throttle: Throttle::new(opts.batch_size, opts.batch_window),
    };
    let mut report = ExecutionReport::new(&plan.run_id, opts.dry_run);
    info!(run_id = %plan.run_id, files = plan.records.len(), dry_run = opts.dry_run, "Starting execution");

    for planned in &plan.records {
        if shutdown::is_requested() {
            warn!(run_id = %plan.run_id, done = report.records.len(), "Interrupted; stopping between files");
            report.interrupted = true;
            break;
        }

        let mut record = if log.already_moved(&planned.file_id) {
            planned
                .with_outcome(RecordStatus::Skipped)
                .note("already executed")
        } else {
            match exec.process(planned) {
                Ok(rec) => rec,
                Err(StoreError::InsufficientScope(scope)) => {
                    let mut rec = planned
                        .with_outcome(RecordStatus::Failed)
                        .error(format!("insufficient scope: {scope}"));
                    rec.dry_run = opts.dry_run;
                    log.append(rec.clone())?;
                    report.push(rec);
                    error!(file_id = %planned.file_id, scope = %scope, "Store refused mutation; aborting run");
                    return Err(DedupeError::AuthInsufficientScope { scope }.into());
                }
                Err(StoreError::NotFound(what)) => planned
                    .with_outcome(RecordStatus::Skipped)
                    .note(format!("source no longer exists ({what})")),
                Err(e) => planned.with_outcome(RecordStatus::Failed).error(e.to_string()),
            }
        };
        record.dry_run = opts.dry_run;

        match record.status {
            RecordStatus::Failed => {
                warn!(file_id = %record.file_id, source = %record.source_path, error = ?record.error, "Relocation failed")
            }
            status => {
                info!(file_id = %record.file_id, dest = %record.dest_path, %status, note = ?record.note, "Processed file")
            }
        }
        log.append(record.clone())?;
        report.push(record);
    }

    info!(
        run_id = %report.run_id,
        moved = report.moved,
        skipped = report.skipped,
        failed = report.failed,
        planned = report.planned,
        interrupted = report.interrupted,
        "Execution finished"
    );
    Ok(report)
}

impl<S: DriveStore + ?Sized> Executor<'_, S> {
    fn process(&mut self, planned: &ExecutionRecord) -> Result<ExecutionRecord, StoreError> {
        let (dir, requested) = split_parent(&planned.dest_path);
        let (_, source_name) = split_parent(&planned.source_path);
        let folder = self.ensure_folder(dir)?;
        if let Some(id) = &folder {
            self.load_children(dir, id)?;
        }
        let name = self.free_name(dir, requested)?;

        if self.opts.dry_run {
            self.folders.claim(dir, &name);
            let mut rec = planned.with_outcome(RecordStatus::Planned);
            rec.dest_path = join(dir, &name);
            rec.note = Some(match collision_note(requested, &name) {
                Some(c) => format!("would move; {c}"),
                None => "would move".to_string(),
            });
            return Ok(rec);
        }

        let folder_id = folder.ok_or_else(|| StoreError::NotFound(dir.to_string()))?;
        let (stored, rename_error) = self.relocate(&planned.file_id, dir, &folder_id, source_name, requested, name)?;

        let mut rec = planned.with_outcome(RecordStatus::Moved);
        rec.dest_path = join(dir, &stored);
        rec.note = collision_note(requested, &stored);
        if let Some(e) = rename_error {
            rec.error = Some(format!("moved but not renamed: {e}"));
        }
        Ok(rec)
    }

    /// Move `file_id` into `folder_id` under `target`, re-picking the name on conflicts.
    /// Returns the name the file ends up with and a rename error, if renaming failed after the move.
    fn relocate(
        &mut self,
        file_id: &str,
        dir: &str,
        folder_id: &str,
        source_name: &str,
        requested: &str,
        mut target: String,
    ) -> Result<(String, Option<String>), StoreError> {
        let mut current = source_name.to_string();
        let mut conflicts = 0u32;

        loop {
            self.throttle.wait();
            match self
                .opts
                .retry
                .run("move", || self.store.move_file(file_id, folder_id))
            {
                Ok(()) => break,
                Err(StoreError::Conflict(what)) if conflicts < MAX_CONFLICT_RETRIES => {
                    conflicts += 1;
                    warn!(file_id, conflict = %what, attempt = conflicts, "Destination name taken; picking another");
                    target = self.refresh_name(dir, folder_id, requested)?;
                    if target != current {
                        self.throttle.wait();
                        self.opts
                            .retry
                            .run("rename", || self.store.rename_file(file_id, &target))?;
                        current = target.clone();
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let mut rename_error = None;
        while current != target {
            self.throttle.wait();
            match self
                .opts
                .retry
                .run("rename", || self.store.rename_file(file_id, &target))
            {
                Ok(()) => current = target.clone(),
                Err(StoreError::Conflict(what)) if conflicts < MAX_CONFLICT_RETRIES => {
                    conflicts += 1;
                    warn!(file_id, conflict = %what, attempt = conflicts, "Renamed target taken; picking another");
                    target = self.refresh_name(dir, folder_id, requested)?;
                }
                Err(e @ StoreError::InsufficientScope(_)) => return Err(e),
                Err(e) => {
                    warn!(file_id, error = %e, "Moved but rename failed");
                    rename_error = Some(e.to_string());
                    break;
                }
            }
        }
        self.folders.claim(dir, &current);
        Ok((current, rename_error))
    }

    fn refresh_name(&mut self, dir: &str, folder_id: &str, requested: &str) -> Result<String, StoreError> {
        self.folders.invalidate_children(dir);
        self.load_children(dir, folder_id)?;
        self.free_name(dir, requested)
    }

    fn free_name(&self, dir: &str, requested: &str) -> Result<String, StoreError> {
        naming::disambiguate(requested, |n| self.folders.is_taken(dir, n))
            .map(|(name, _)| name)
            .ok_or_else(|| StoreError::Conflict(format!("no free name for '{requested}' in {dir}")))
    }

    /// Folder id for `path`; `None` when it does not exist and this is a dry run.
    fn ensure_folder(&mut self, path: &str) -> Result<Option<String>, StoreError> {
        if let Some(known) = self.folders.get(path) {
            return Ok(known.map(str::to_string));
        }
        let mut current = crate::resolve::ROOT_PATH.to_string();
        let mut parent = self.folders.get(&current).flatten().map(str::to_string);
        for seg in segments(path) {
            let next = join(&current, seg);
            if self.folders.get(&next).is_none() {
                match &parent {
                    Some(pid) => {
                        self.load_children(&current, pid)?;
                        if self.folders.get(&next).is_none() {
                            let id = if self.opts.dry_run {
                                None
                            } else {
                                Some(self.create_folder(pid, seg)?)
                            };
                            self.folders.insert_folder(&current, seg, id);
                        }
                    }
                    None => self.folders.insert_folder(&current, seg, None),
                }
            }
            parent = self.folders.get(&next).flatten().map(str::to_string);
            current = next;
        }
        Ok(parent)
    }

    fn load_children(&mut self, path: &str, folder_id: &str) -> Result<(), StoreError> {
        if self.folders.children_known(path) {
            return Ok(());
        }
        let children = self
            .opts
            .retry
            .run("list_children", || self.store.list_children(folder_id))?;
        debug!(path, count = children.len(), "Loaded destination folder children");
        self.folders.record_children(path, &children);
        Ok(())
    }

    fn create_folder(&mut self, parent_id: &str, name: &str) -> Result<String, StoreError> {
        self.throttle.wait();
        let id = self
            .opts
            .retry
            .run("create_folder", || self.store.create_folder(parent_id, name))?;
        info!(parent_id, name, folder_id = %id, "Created folder");
        Ok(id)
    }
}

fn collision_note(requested: &str, stored: &str) -> Option<String> {
    (requested != stored).then(|| format!("name collision: stored as '{stored}'"))
}
