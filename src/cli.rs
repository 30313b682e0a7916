//! CLI definition and parsing.
//! Defines Args and provides parse() for command-line handling.
//!
//! Notes:
//! - Global flags may appear before or after the subcommand.
//! - --debug is a shorthand for --log-level debug.

use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

use crate::config::types::{Config, LogLevel};

/// Find duplicate files in a drive listing and quarantine them.
/// CLI flags override config values (which are loaded from XML if present).
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Find duplicate files in a cloud drive and quarantine them safely (Rust)"
)]
pub struct Args {
    /// Explicit config file (instead of DRIVE_DEDUPE_CONFIG or the default location).
    #[arg(long, global = true, value_hint = ValueHint::FilePath, help = "Path to config.xml")]
    pub config: Option<PathBuf>,

    /// Enable debug logging (equivalent to `--log-level debug`).
    #[arg(
        short = 'd',
        long,
        global = true,
        help = "Enable debug logging (shorthand for --log-level debug)"
    )]
    pub debug: bool,

    /// Set log level. One of: quiet, normal, info, debug.
    #[arg(long, global = true, help = "Set log level: quiet, normal, info, debug")]
    pub log_level: Option<String>,

    /// Emit logs in structured JSON (includes timestamp, level, and structured fields).
    #[arg(long, global = true, help = "Emit logs in structured JSON")]
    pub json: bool,

    #[arg(long, global = true, value_hint = ValueHint::DirPath, help = "Override the output directory")]
    pub output_dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "STORE_PATH", help = "Override the quarantine folder")]
    pub quarantine: Option<String>,

    #[arg(long, global = true, help = "Mutating remote calls per batch window")]
    pub batch_size: Option<usize>,

    /// Additional excluded path prefix; repeat for more. Added to the configured list.
    #[arg(long = "exclude", global = true, value_name = "STORE_PATH")]
    pub exclude: Vec<String>,

    #[arg(long, global = true, value_hint = ValueHint::FilePath, help = "Store snapshot (JSON) to operate on")]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List the store, group duplicates and write the CSV report.
    Scan {
        /// Only consider files at or below this store path.
        #[arg(long, value_name = "STORE_PATH")]
        path: Option<String>,
        /// Discard the cached listing and fetch everything again.
        #[arg(long)]
        refresh: bool,
    },
    /// Show groups that still need a decision (new or stale).
    Pending,
    /// Record a decision for one group.
    Decide {
        /// Group signature (or an unambiguous prefix of it).
        signature: String,
        /// Keep this file id; every other member is quarantined.
        #[arg(long, value_name = "FILE_ID", conflicts_with = "skip", required_unless_present = "skip")]
        keep: Option<String>,
        /// Leave the whole group alone.
        #[arg(long)]
        skip: bool,
        /// Replace a decision that was already exported.
        #[arg(long)]
        revise: bool,
    },
    /// Write the decisions export (JSON).
    Export,
    /// Show the relocations the current decisions would perform.
    Plan,
    /// Perform the planned relocations.
    Execute {
        /// Compute everything, change nothing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the config file location in effect and exit.
    PrintConfig,
}

impl Args {
    /// Effective log level derived from flags.
    /// Precedence: --debug > --log-level value > None (use config default).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level.as_deref().and_then(LogLevel::parse)
    }

    /// Apply CLI overrides to a loaded Config (in-place). No-ops for unset flags.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(dir) = &self.output_dir {
            cfg.output_dir = dir.clone();
        }
        if let Some(q) = &self.quarantine {
            cfg.quarantine_path = q.clone();
        }
        if let Some(n) = self.batch_size {
            cfg.batch_size = n;
        }
        for prefix in &self.exclude {
            if !cfg.exclude.contains(prefix) {
                cfg.exclude.push(prefix.clone());
            }
        }
        if let Some(store) = &self.store {
            cfg.store_snapshot = Some(store.clone());
        }
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
        if let Command::Scan { path: Some(p), .. } = &self.command {
            cfg.scan_path = Some(p.clone());
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decide_requires_keep_or_skip() {
        assert!(Args::try_parse_from(["drive_dedupe", "decide", "abc"]).is_err());
        assert!(Args::try_parse_from(["drive_dedupe", "decide", "abc", "--keep", "A", "--skip"]).is_err());
        let args = Args::try_parse_from(["drive_dedupe", "decide", "abc", "--keep", "A"]).unwrap();
        assert_eq!(
            args.command,
            Command::Decide {
                signature: "abc".into(),
                keep: Some("A".into()),
                skip: false,
                revise: false
            }
        );
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "drive_dedupe",
            "execute",
            "--dry-run",
            "--exclude",
            "/A",
            "--exclude",
            "/B",
            "--debug",
        ])
        .unwrap();
        assert_eq!(args.command, Command::Execute { dry_run: true });
        assert_eq!(args.exclude, vec!["/A", "/B"]);
        assert_eq!(args.effective_log_level(), Some(LogLevel::Debug));
    }

    #[test]
    fn overrides_win_over_config() {
        let args = Args::try_parse_from([
            "drive_dedupe",
            "--quarantine",
            "/Q",
            "--batch-size",
            "7",
            "scan",
            "--path",
            "/Photos",
        ])
        .unwrap();
        let mut cfg = Config::new("/tmp/out", "/_dupes");
        cfg.exclude = vec!["/Trash".into()];
        args.apply_overrides(&mut cfg);
        assert_eq!(cfg.quarantine_path, "/Q");
        assert_eq!(cfg.batch_size, 7);
        assert_eq!(cfg.scan_path.as_deref(), Some("/Photos"));
        assert_eq!(cfg.exclude, vec!["/Trash"]);
    }
}
