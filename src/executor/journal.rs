//! Append-only execution log.
//!
//! One JSON object per line. Records are never edited or removed; a record
//! is appended only after its remote call has committed. Each append
//! replaces the whole file atomically, so a crash leaves either the old or
//! the new content, never a torn line.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::platform::write_atomic_0600;

pub const EXECUTION_LOG_FILE: &str = "execution_log.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Planned,
    Moved,
    Skipped,
    Failed,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordStatus::Planned => "planned",
            RecordStatus::Moved => "moved",
            RecordStatus::Skipped => "skipped",
            RecordStatus::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub run_id: String,
    pub file_id: String,
    pub source_path: String,
    pub dest_path: String,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    pub timestamp: String,
}

impl ExecutionRecord {
    /// A fresh `planned` record.
    pub fn planned(run_id: &str, file_id: &str, source_path: &str, dest_path: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            file_id: file_id.to_string(),
            source_path: source_path.to_string(),
            dest_path: dest_path.to_string(),
            status: RecordStatus::Planned,
            error: None,
            note: None,
            dry_run: false,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Copy of this record with a new outcome and timestamp.
    pub fn with_outcome(&self, status: RecordStatus) -> Self {
        Self {
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
            ..self.clone()
        }
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug)]
pub struct ExecutionLog {
    path: PathBuf,
    records: Vec<ExecutionRecord>,
    content: String,
    moved: HashSet<String>,
}

impl ExecutionLog {
    /// Open the log in `dir`; a missing file is an empty log.
    ///
    /// Lines that do not parse are kept in the file but ignored.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(EXECUTION_LOG_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("read execution log '{}'", path.display()));
            }
        };

        let mut log = Self {
            path,
            records: Vec::new(),
            content,
            moved: HashSet::new(),
        };
        if !log.content.is_empty() && !log.content.ends_with('\n') {
            log.content.push('\n');
        }
        let mut bad = 0usize;
        for (lineno, line) in log.content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ExecutionRecord>(line) {
                Ok(rec) => {
                    if rec.status == RecordStatus::Moved && !rec.dry_run {
                        log.moved.insert(rec.file_id.clone());
                    }
                    log.records.push(rec);
                }
                Err(e) => {
                    bad += 1;
                    warn!(line = lineno + 1, error = %e, "Ignoring unreadable execution log line");
                }
            }
        }
        debug!(path = %log.path.display(), records = log.records.len(), bad, "Opened execution log");
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, record: ExecutionRecord) -> Result<()> {
        let line = serde_json::to_string(&record).context("encode execution record")?;
        let mut next = String::with_capacity(self.content.len() + line.len() + 1);
        next.push_str(&self.content);
        next.push_str(&line);
        next.push('\n');
        write_atomic_0600(&self.path, next.as_bytes())
            .with_context(|| format!("append to execution log '{}'", self.path.display()))?;

        self.content = next;
        if record.status == RecordStatus::Moved && !record.dry_run {
            self.moved.insert(record.file_id.clone());
        }
        self.records.push(record);
        Ok(())
    }

    /// True when a real (non-dry) run already moved this file.
    pub fn already_moved(&self, file_id: &str) -> bool {
        self.moved.contains(file_id)
    }

    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    pub fn for_run<'a>(&'a self, run_id: &'a str) -> impl Iterator<Item = &'a ExecutionRecord> + 'a {
        self.records.iter().filter(move |r| r.run_id == run_id)
    }
}
