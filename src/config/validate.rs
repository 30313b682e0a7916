//! Config validation logic.
//! Verifies the quarantine and scan paths, numeric limits, and that the output directory is usable.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::types::Config;
use crate::filter::{is_under, normalize};
use crate::platform::is_atomic_temp_name;
use crate::resolve::ROOT_PATH;

/// State-file temps older than this belong to a run that died mid-write.
const STALE_TEMP_AGE: Duration = Duration::from_secs(3600);

impl Config {
    /// Validate settings and make sure the output directory exists and is writable.
    pub fn validate(&self) -> Result<()> {
        // 1) Quarantine: a real folder below the store root.
        if self.quarantine_path.trim().is_empty() {
            bail!("quarantine_path must not be empty");
        }
        let quarantine = normalize(&self.quarantine_path);
        if quarantine == ROOT_PATH {
            error!("quarantine_path resolves to the store root");
            bail!("quarantine_path must not be the store root '/'");
        }

        // 2) A scan scope inside the quarantine would never find anything.
        if let Some(scope) = self.scan_path.as_deref() {
            let scope = normalize(scope);
            if is_under(&scope, &quarantine) {
                bail!("scan_path '{scope}' lies inside quarantine_path '{quarantine}'");
            }
        }
        for prefix in &self.exclude {
            if normalize(prefix) == ROOT_PATH {
                warn!("exclude entry '/' excludes every file");
            }
        }

        // 3) Limits.
        if self.batch_size == 0 {
            bail!("batch_size must be greater than zero");
        }
        if self.retry_attempts == 0 {
            bail!("retry_attempts must be greater than zero");
        }

        // 4) Output directory: create if missing; ensure writable.
        ensure_dir_is_or_create(&self.output_dir, "output_dir")?;
        ensure_writable(&self.output_dir, "output_dir")?;
        sweep_stale_temp_files(&self.output_dir, STALE_TEMP_AGE);

        info!(
            "Config validated: output='{}' quarantine='{}' batch_size={} log_file='{}'",
            self.output_dir.display(),
            quarantine,
            self.batch_size,
            self.log_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<none>".into())
        );
        Ok(())
    }
}

/// Ensure directory exists (create if missing). If exists, it must be a directory.
fn ensure_dir_is_or_create(path: &Path, name: &str) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            error!("{name} exists but isn't a directory: {}", path.display());
            bail!("{name} exists but isn't a directory: {}", path.display());
        }
    } else {
        fs::create_dir_all(path).with_context(|| {
            format!("Failed to create {name} directory '{}'", path.display())
        })?;
        info!("Created {name} directory: {}", path.display());
    }
    Ok(())
}

/// Ensure directory is writable using a non-destructive probe file.
fn ensure_writable(path: &Path, name: &str) -> Result<()> {
    let probe = path.join(format!(".drive_dedupe_probe_{}.tmp", std::process::id()));
    fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&probe)
        .with_context(|| {
            format!("Cannot write to {name} '{}'; check permissions", path.display())
        })?;
    let _ = fs::remove_file(&probe);
    debug!("{name} writable: {}", path.display());
    Ok(())
}

/// Remove leftovers of interrupted state writes. Best effort.
fn sweep_stale_temp_files(dir: &Path, max_age: Duration) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        if !is_atomic_temp_name(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.elapsed().ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %entry.path().display(), error = %e, "Could not remove stale temp file"),
        }
    }
    if removed > 0 {
        info!(removed, dir = %dir.display(), "Removed leftover temp files from an interrupted write");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_output_dir() {
        let td = tempdir().unwrap();
        let cfg = Config::new(td.path().join("out"), "/_dupes");
        cfg.validate().unwrap();
        assert!(td.path().join("out").is_dir());
    }

    #[test]
    fn rejects_root_quarantine() {
        let td = tempdir().unwrap();
        let cfg = Config::new(td.path(), "/");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_scope_inside_quarantine() {
        let td = tempdir().unwrap();
        let mut cfg = Config::new(td.path(), "/_dupes");
        cfg.scan_path = Some("/_dupes/Q".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_batch_size() {
        let td = tempdir().unwrap();
        let mut cfg = Config::new(td.path(), "/_dupes");
        cfg.batch_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn sweeps_only_old_temp_files() {
        let td = tempdir().unwrap();
        let temp = td.path().join(".drive_dedupe.tmp.1.2.3.decisions.json");
        fs::write(&temp, b"{").unwrap();
        fs::write(td.path().join("decisions.json"), b"{}").unwrap();

        assert_eq!(sweep_stale_temp_files(td.path(), STALE_TEMP_AGE), 0);
        assert!(temp.exists(), "a fresh temp may still be in use");

        assert_eq!(sweep_stale_temp_files(td.path(), Duration::ZERO), 1);
        assert!(!temp.exists());
        assert!(td.path().join("decisions.json").exists());
    }
}
