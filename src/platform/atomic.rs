//! Whole-file replacement for state files.
//!
//! Contents go to a hidden sibling first and are renamed over the target,
//! so a reader sees either the old file or the new one.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const TMP_PREFIX: &str = ".drive_dedupe.tmp.";

static SEQ: AtomicU64 = AtomicU64::new(0);

/// `.drive_dedupe.tmp.<pid>.<nanos>.<seq>` next to `target`.
fn sibling_temp(target: &Path, dir: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    let stem = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.join(format!("{TMP_PREFIX}{}.{nanos}.{seq}.{stem}", std::process::id()))
}

/// True for leftovers of an interrupted state write.
pub fn is_atomic_temp_name(name: &str) -> bool {
    name.starts_with(TMP_PREFIX)
}

fn temp_options() -> OpenOptions {
    let mut opts = OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    opts
}

/// Replace `path` with `contents`. On Unix the file is 0600 and the parent
/// directory is synced after the rename.
pub fn write_atomic_0600(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("create directory '{}'", dir.display()))?;

    let tmp = sibling_temp(path, dir);
    let written = temp_options()
        .open(&tmp)
        .and_then(|mut f| f.write_all(contents).and_then(|()| f.sync_all()));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("write '{}'", tmp.display()));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("replace '{}'", path.display()));
    }

    #[cfg(unix)]
    fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .with_context(|| format!("sync directory '{}'", dir.display()))?;
    Ok(())
}
