//! Default path helpers and symlink checks.
//! Determines OS-appropriate config/log/output paths and detects symlinked ancestors for safety.

use dirs::{config_dir, data_dir};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::CONFIG_ENV;

const APP_DIR: &str = "drive_dedupe";

/// Config path in effect: `$DRIVE_DEDUPE_CONFIG` when set, else the OS default.
///
/// A relative override is taken against the current directory; an override
/// naming a directory means `config.xml` inside it.
pub fn config_path() -> Option<PathBuf> {
    match env::var_os(CONFIG_ENV) {
        Some(p) if !p.is_empty() => {
            let mut path = PathBuf::from(p);
            if path.is_relative()
                && let Ok(cwd) = env::current_dir()
            {
                path = cwd.join(path);
            }
            if path.is_dir() {
                path.push("config.xml");
            }
            Some(path)
        }
        _ => default_config_path(),
    }
}

/// True when the config location comes from `$DRIVE_DEDUPE_CONFIG`.
pub fn config_env_set() -> bool {
    env::var_os(CONFIG_ENV).is_some_and(|p| !p.is_empty())
}

/// OS-appropriate default config path.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(mut base) = config_dir() {
        base.push(APP_DIR);
        base.push("config.xml");
        Some(base)
    } else {
        env::var("HOME").ok().map(|h| {
            PathBuf::from(h)
                .join(".config")
                .join(APP_DIR)
                .join("config.xml")
        })
    }
}

/// OS-appropriate default log file path (data dir).
pub fn default_log_path() -> Option<PathBuf> {
    data_base().map(|b| b.join(format!("{APP_DIR}.log")))
}

/// Default output directory for scan state, decisions and logs.
pub fn default_output_dir() -> PathBuf {
    data_base()
        .map(|b| b.join("output"))
        .unwrap_or_else(|| PathBuf::from(".output"))
}

fn data_base() -> Option<PathBuf> {
    if let Some(base) = data_dir() {
        Some(base.join(APP_DIR))
    } else {
        env::var("HOME").ok().map(|h| {
            PathBuf::from(h)
                .join(".local")
                .join("share")
                .join(APP_DIR)
        })
    }
}

/// Return true if any existing ancestor of `path` is a symlink.
pub fn path_has_symlink_ancestor(path: &Path) -> io::Result<bool> {
    let mut p = path.parent();
    while let Some(anc) = p {
        if anc.exists() {
            let meta = fs::symlink_metadata(anc)?;
            if meta.file_type().is_symlink() {
                return Ok(true);
            }
        }
        p = anc.parent();
    }
    Ok(false)
}
