//! Runtime settings and their defaults, plus conversions into the option
//! structs the scan and execute paths take.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::paths;
use super::{
    BATCH_SIZE_DEFAULT, BATCH_WINDOW_MS_DEFAULT, QUARANTINE_DEFAULT, RETRY_ATTEMPTS_DEFAULT,
    RETRY_BASE_MS_DEFAULT,
};
use crate::executor::ExecuteOptions;
use crate::scan::ScanScope;
use crate::store::{DEFAULT_ROOT_ID, RetryPolicy};

/// Console and log-file verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Quiet,
    #[default]
    Normal,
    /// Adds per-file progress.
    Info,
    /// Adds store calls and retry attempts.
    Debug,
}

/// Accepted spellings; the first entry per level is the canonical one.
const LEVEL_NAMES: &[(&str, LogLevel)] = &[
    ("quiet", LogLevel::Quiet),
    ("error", LogLevel::Quiet),
    ("none", LogLevel::Quiet),
    ("normal", LogLevel::Normal),
    ("info", LogLevel::Info),
    ("verbose", LogLevel::Info),
    ("debug", LogLevel::Debug),
    ("trace", LogLevel::Debug),
];

impl LogLevel {
    /// Case-insensitive lookup of a level name.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        LEVEL_NAMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|&(_, lvl)| lvl)
    }

    pub fn as_str(self) -> &'static str {
        LEVEL_NAMES
            .iter()
            .find(|&&(_, lvl)| lvl == self)
            .map_or("normal", |(name, _)| name)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            let names: Vec<_> = LEVEL_NAMES.iter().map(|(n, _)| *n).collect();
            format!("invalid log level '{s}' (expected one of: {})", names.join(", "))
        })
    }
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Local directory for the listing cache, decisions, reports and the execution log
    pub output_dir: PathBuf,
    /// Store folder that receives relocated duplicates
    pub quarantine_path: String,
    /// Mutating remote calls allowed per batch window
    pub batch_size: usize,
    /// Store path prefixes left out of grouping
    pub exclude: Vec<String>,
    /// Only consider files at or below this store path
    pub scan_path: Option<String>,
    /// Id of the store root folder
    pub root_id: String,
    /// JSON snapshot used as the store
    pub store_snapshot: Option<PathBuf>,
    pub retry_attempts: u32,
    pub retry_base: Duration,
    pub batch_window: Duration,
    /// Console verbosity
    pub log_level: LogLevel,
    /// Optional path to a log file
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: paths::default_output_dir(),
            quarantine_path: QUARANTINE_DEFAULT.to_string(),
            batch_size: BATCH_SIZE_DEFAULT,
            exclude: Vec::new(),
            scan_path: None,
            root_id: DEFAULT_ROOT_ID.to_string(),
            store_snapshot: None,
            retry_attempts: RETRY_ATTEMPTS_DEFAULT,
            retry_base: Duration::from_millis(RETRY_BASE_MS_DEFAULT),
            batch_window: Duration::from_millis(BATCH_WINDOW_MS_DEFAULT),
            log_level: LogLevel::Normal,
            log_file: None,
        }
    }
}

impl Config {
    /// Construct a Config with an explicit output directory and quarantine path; other fields use defaults.
    pub fn new(output_dir: impl Into<PathBuf>, quarantine_path: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            quarantine_path: quarantine_path.into(),
            ..Default::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_base)
    }

    /// Exclusions plus scan scope as configured for this invocation.
    /// The quarantine root is added by the scan itself.
    pub fn scan_scope(&self) -> ScanScope {
        ScanScope::new(self.scan_path.as_deref(), &self.exclude)
    }

    pub fn execute_options(&self, dry_run: bool) -> ExecuteOptions {
        ExecuteOptions {
            dry_run,
            retry: self.retry_policy(),
            batch_size: self.batch_size,
            batch_window: self.batch_window,
        }
    }
}
