//! Application orchestrator.
//! Loads/merges config, initializes logging, installs the signal handler,
//! validates settings and dispatches the subcommand.

use anyhow::{Context, Result, bail};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use drive_dedupe::cli::{Args, Command};
use drive_dedupe::config::{LoadResult, config_path, load_config_from_xml_path, load_or_init};
use drive_dedupe::decisions::{Choice, DecisionState, DecisionStore};
use drive_dedupe::executor::{self, ExecutionLock, ExecutionLog};
use drive_dedupe::listing::ListingCache;
use drive_dedupe::output as out;
use drive_dedupe::report::{self, EXPORT_FILE, REPORT_FILE, format_size};
use drive_dedupe::scan::{ScanReport, ScanScope, run_scan, scan_listing};
use drive_dedupe::store::{DriveStore, SnapshotStore};
use drive_dedupe::{Config, DedupeError, shutdown};

use crate::logging::init_tracing;

/// Run the CLI application.
pub fn run(args: Args) -> Result<()> {
    // Handle print-config before logging init
    if args.command == Command::PrintConfig {
        print_config_location(&args);
        return Ok(());
    }

    let mut cfg = match &args.config {
        Some(path) => load_config_from_xml_path(path)?,
        None => match load_or_init()? {
            LoadResult::Loaded(cfg, _) => cfg,
            LoadResult::Defaults => Config::default(),
            LoadResult::CreatedTemplate(path) => {
                out::print_success(&format!(
                    "A template drive_dedupe config was written to: {}",
                    path.display()
                ));
                out::print_info("Edit the file to set `store_snapshot`, `output_dir` and `quarantine_path`, then re-run this command. To use a different location set DRIVE_DEDUPE_CONFIG or pass --config.");
                return Ok(());
            }
        },
    };
    args.apply_overrides(&mut cfg);

    // Initialize logging and capture the guard so we can drop it on signal
    let guard_opt = init_tracing(&cfg.log_level, cfg.log_file.as_deref(), args.json).map_err(|e| {
        out::print_error(&format!("Failed to initialize logging: {e}"));
        e
    })?;

    // Guard needs to be dropped on SIGINT to flush logs
    let guard_slot = Arc::new(Mutex::new(guard_opt));
    {
        let guard_slot = Arc::clone(&guard_slot);
        ctrlc::set_handler(move || {
            shutdown::request();
            out::print_warn("Received interrupt; finishing the current file and stopping...");
            if let Ok(mut g) = guard_slot.lock() {
                let _ = g.take();
            }
        })
        .context("failed to install signal handler")?;
    }

    debug!(command = ?args.command, "Starting drive_dedupe");

    let result = cfg.validate().and_then(|()| dispatch(&args.command, &cfg));
    if let Err(e) = &result {
        log_failure(e);
    }

    // Ensure logs are flushed before exit
    if let Ok(mut g) = guard_slot.lock() {
        let _ = g.take();
    }
    result
}

fn print_config_location(args: &Args) {
    if let Some(p) = &args.config {
        out::print_info(&format!("Using --config (explicit):\n  {}\n", p.display()));
        return;
    }
    match config_path() {
        Some(p) => {
            out::print_info(&format!("drive_dedupe config path:\n  {}\n", p.display()));
            if p.exists() {
                out::print_info("A config file exists at that location.");
            } else {
                out::print_info("No config file exists there yet. Run any other command to create a template.");
            }
            out::print_info("To override, set DRIVE_DEDUPE_CONFIG or pass --config.");
        }
        None => out::print_error("Could not determine a default config path"),
    }
}

fn log_failure(e: &anyhow::Error) {
    match e.downcast_ref::<DedupeError>() {
        Some(de) => error!(code = de.code(), kind = de.kind(), error = %de, "Command failed"),
        None => error!(error = ?e, "Command failed"),
    }
}

fn dispatch(command: &Command, cfg: &Config) -> Result<()> {
    match command {
        Command::Scan { refresh, .. } => cmd_scan(cfg, *refresh),
        Command::Pending => cmd_pending(cfg),
        Command::Decide {
            signature,
            keep,
            skip,
            revise,
        } => {
            let choice = match (keep, skip) {
                (Some(id), false) => Choice::Keep(id.clone()),
                (None, true) => Choice::Skip,
                _ => bail!("pass exactly one of --keep <FILE_ID> or --skip"),
            };
            cmd_decide(cfg, signature, choice, *revise)
        }
        Command::Export => cmd_export(cfg),
        Command::Plan => cmd_plan(cfg),
        Command::Execute { dry_run } => cmd_execute(cfg, *dry_run),
        Command::PrintConfig => Ok(()),
    }
}

fn open_store(cfg: &Config) -> Result<SnapshotStore> {
    let Some(path) = &cfg.store_snapshot else {
        bail!("no store configured: set <store_snapshot> in the config or pass --store");
    };
    let store = SnapshotStore::open(path)?;
    if store.root_id() != cfg.root_id {
        warn!(store_root = store.root_id(), configured = %cfg.root_id, "Store root id differs from configured root_id");
    }
    Ok(store)
}

/// Group the cached listing with the scope the last scan used.
fn load_scan(cfg: &Config) -> Result<ScanReport> {
    let listing = ListingCache::load(&cfg.output_dir)?.with_context(|| {
        format!(
            "no cached listing in '{}'; run `drive_dedupe scan` first",
            cfg.output_dir.display()
        )
    })?;
    let configured = cfg.scan_scope();
    let scope = match ScanScope::load(&cfg.output_dir)? {
        Some(saved) => {
            if saved != configured {
                info!(
                    saved = ?saved,
                    configured = ?configured,
                    "Using the scope of the last scan; re-run `drive_dedupe scan` to apply new filter settings"
                );
            }
            saved
        }
        None => configured,
    };
    Ok(scan_listing(
        &listing,
        &cfg.root_id,
        &scope.filter(),
        &cfg.quarantine_path,
    ))
}

fn cmd_scan(cfg: &Config, refresh: bool) -> Result<()> {
    let mut store = open_store(cfg)?;
    let scope = cfg.scan_scope();
    let scan = run_scan(
        &mut store,
        &cfg.output_dir,
        &cfg.retry_policy(),
        &scope.filter(),
        &cfg.quarantine_path,
        refresh,
    )?;
    scope.save(&cfg.output_dir)?;
    if let Some(p) = &scope.scan_path {
        out::print_info(&format!("Scope {p} recorded; later commands use it until the next scan"));
    }
    let report_path = cfg.output_dir.join(REPORT_FILE);
    let rows = report::write_duplicate_report(&report_path, &scan.groups)?;
    let decisions = DecisionStore::open(&cfg.output_dir)?;
    let dstats = decisions.stats(&scan.groups);

    out::print_success(&format!(
        "Scanned {} record(s): {} eligible, {} excluded, {} out of scope, {} without fingerprint",
        scan.total_records, scan.eligible, scan.excluded, scan.out_of_scope, scan.non_participating
    ));
    out::print_user(&format!(
        "Groups: {} ({} uncertain), pairs: {}, potential savings: {}",
        scan.stats.groups,
        scan.stats.uncertain,
        scan.stats.pairs,
        format_size(scan.stats.savings)
    ));
    out::print_user(&format!(
        "Decisions: {} keep, {} skip, {} pending, {} stale",
        dstats.decided, dstats.skipped, dstats.pending, dstats.stale
    ));
    for u in &scan.unresolved {
        out::print_warn(&format!("Unresolved path for {} ({}): {}", u.id, u.name, u.error));
    }
    out::print_info(&format!("Report ({rows} row(s)) written to {}", report_path.display()));
    Ok(())
}

fn cmd_pending(cfg: &Config) -> Result<()> {
    let scan = load_scan(cfg)?;
    let decisions = DecisionStore::open(&cfg.output_dir)?;
    let mut shown = 0usize;
    for g in &scan.groups {
        let tag = match decisions.state_for(g) {
            DecisionState::Fresh(_) => continue,
            DecisionState::Stale(d) => format!("stale: decided {} for a different membership", d.decided_at),
            DecisionState::Pending => "pending".to_string(),
        };
        out::print_group(g, &tag);
        shown += 1;
    }
    if shown == 0 {
        out::print_success("Every group has a current decision.");
    } else {
        out::print_info(&format!(
            "{shown} group(s) need a decision; `*` marks the reference. Use `drive_dedupe decide <signature> --keep <id>` or `--skip`."
        ));
    }
    Ok(())
}

fn cmd_decide(cfg: &Config, signature: &str, choice: Choice, revise: bool) -> Result<()> {
    let scan = load_scan(cfg)?;
    let group = scan.find_group(signature)?;
    let mut decisions = DecisionStore::open(&cfg.output_dir)?;
    let decision = if revise {
        decisions.revise_decision(group, choice)?
    } else {
        decisions.record_decision(group, choice)?
    };
    match decision.kept() {
        Some(id) => out::print_success(&format!(
            "Group {}: keeping {id}, {} file(s) to quarantine",
            group.signature.short(),
            group.members.len() - 1
        )),
        None => out::print_success(&format!("Group {}: skipped", group.signature.short())),
    }
    Ok(())
}

fn cmd_export(cfg: &Config) -> Result<()> {
    let scan = load_scan(cfg)?;
    let mut decisions = DecisionStore::open(&cfg.output_dir)?;
    let entries = decisions.export(&scan.groups)?;
    let path = cfg.output_dir.join(EXPORT_FILE);
    report::write_decisions_export(&path, &entries)?;
    out::print_success(&format!("Exported {} decision(s) to {}", entries.len(), path.display()));
    Ok(())
}

fn cmd_plan(cfg: &Config) -> Result<()> {
    let scan = load_scan(cfg)?;
    let decisions = DecisionStore::open(&cfg.output_dir)?;
    let plan = executor::plan(&scan.groups, &decisions, &cfg.quarantine_path);
    for rec in &plan.records {
        out::print_record(rec);
    }
    let s = plan.summary;
    out::print_info(&format!(
        "{} file(s) from {} group(s); {} skipped, {} pending, {} stale",
        s.files, s.actionable, s.skipped_groups, s.pending, s.stale
    ));
    if s.uncertain > 0 {
        out::print_warn(&format!("{} planned group(s) have differing member sizes", s.uncertain));
    }
    Ok(())
}

fn cmd_execute(cfg: &Config, dry_run: bool) -> Result<()> {
    let _lock = ExecutionLock::acquire(&cfg.output_dir)?;
    let scan = load_scan(cfg)?;
    let decisions = DecisionStore::open(&cfg.output_dir)?;
    let plan = executor::plan(&scan.groups, &decisions, &cfg.quarantine_path);
    if plan.is_empty() {
        out::print_info("Nothing to do: no group has a current keep decision.");
        return Ok(());
    }

    let mut store = open_store(cfg)?;
    let mut log = ExecutionLog::open(&cfg.output_dir)?;
    let report = executor::execute(&mut store, &mut log, &plan, &cfg.execute_options(dry_run))?;
    for rec in &report.records {
        out::print_record(rec);
    }
    info!(log = %log.path().display(), "Execution log updated");

    let summary = format!(
        "run {}: {} moved, {} skipped, {} failed, {} planned",
        report.run_id, report.moved, report.skipped, report.failed, report.planned
    );
    if report.interrupted {
        out::print_warn(&format!("Interrupted; {summary}. Re-run to continue."));
        return Err(DedupeError::Interrupted.into());
    }
    if report.failed > 0 {
        for f in report.failures() {
            out::print_error(&format!(
                "{} ({}): {}",
                f.file_id,
                f.source_path,
                f.error.as_deref().unwrap_or("unknown error")
            ));
        }
        bail!("{summary}; see {}", log.path().display());
    }
    if dry_run {
        out::print_info(&format!("Dry run, nothing changed: {summary}"));
    } else {
        out::print_success(&summary);
    }
    Ok(())
}
