//! Advisory execution lock.
//!
//! Only one execution may run per output directory at a time. The lock is an
//! exclusive `fs2` lock on `execution.lock` inside that directory, held for the
//! lifetime of the guard. It does not coordinate different output
//! directories writing to the same quarantine root.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::trace;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use crate::errors::DedupeError;

pub const LOCK_FILE: &str = "execution.lock";

/// RAII guard; the lock is released on drop.
#[derive(Debug)]
pub struct ExecutionLock {
    file: File,
    path: PathBuf,
}

impl ExecutionLock {
    /// Take the lock without blocking. A held lock yields `DedupeError::ConcurrentRun`.
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILE);
        let mut opts = OpenOptions::new();
        opts.read(true).write(true).create(true).truncate(false);
        #[cfg(unix)]
        opts.mode(0o600);
        let file = opts
            .open(&path)
            .with_context(|| format!("open lock file '{}'", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                trace!(path = %path.display(), "execution lock acquired");
                Ok(Self { file, path })
            }
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Err(DedupeError::ConcurrentRun(path.display().to_string()).into())
            }
            Err(e) => Err(e).with_context(|| format!("lock '{}'", path.display())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ExecutionLock {
    fn drop(&mut self) {
        // The file stays on disk; only the lock is released.
        let _ = FileExt::unlock(&self.file);
        trace!(path = %self.path.display(), "execution lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let td = tempdir().unwrap();
        let first = ExecutionLock::acquire(td.path()).unwrap();
        let err = ExecutionLock::acquire(td.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DedupeError>(),
            Some(DedupeError::ConcurrentRun(_))
        ));
        drop(first);
        assert!(ExecutionLock::acquire(td.path()).is_ok());
    }
}
