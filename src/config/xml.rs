//! XML configuration support.
//! - Loads settings from config.xml (quick_xml).
//! - Creates a secure template if missing (unless DRIVE_DEDUPE_CONFIG is set).
//!
//! Notes:
//! - This module only reads/writes the config file; validation happens elsewhere.
//! - Unknown XML fields are rejected to surface misconfigurations early.

use anyhow::{Context, Result, anyhow, bail};
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::paths::{config_env_set, config_path, default_log_path, path_has_symlink_ancestor};
use super::{
    BATCH_SIZE_DEFAULT, BATCH_WINDOW_MS_DEFAULT, CONFIG_ENV, QUARANTINE_DEFAULT,
    RETRY_ATTEMPTS_DEFAULT, RETRY_BASE_MS_DEFAULT,
};

use crate::config::types::{Config, LogLevel};
use crate::platform::{set_dir_mode_0700, write_atomic_0600};

/// Struct mirroring the XML config for deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    output_dir: Option<String>,
    quarantine_path: Option<String>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    batch_size: Option<u64>,
    /// Repeated `<exclude>` elements
    #[serde(default)]
    exclude: Vec<String>,
    scan_path: Option<String>,
    root_id: Option<String>,
    store_snapshot: Option<String>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    retry_attempts: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    retry_base_ms: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    batch_window_ms: Option<u64>,
    log_level: Option<String>,
    log_file: Option<String>,
}

// Custom deserializer that trims surrounding whitespace for optional u64
fn de_u64_trimmed_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| s.trim().parse::<u64>().ok()))
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Outcome of looking for the config file.
#[derive(Debug)]
pub enum LoadResult {
    /// Config read from this file.
    Loaded(Config, PathBuf),
    /// No config location could be determined; built-in defaults apply.
    Defaults,
    /// A template was written here; the user should edit it first.
    CreatedTemplate(PathBuf),
}

/// Find and load the config, writing a template at the default location if none exists.
///
/// A missing file named by `DRIVE_DEDUPE_CONFIG` is an error; no template is
/// written to a location the user chose explicitly.
pub fn load_or_init() -> Result<LoadResult> {
    let Some(path) = config_path() else {
        return Ok(LoadResult::Defaults);
    };
    if !path.exists() {
        if config_env_set() {
            bail!(
                "config file named by {CONFIG_ENV} does not exist: {}",
                path.display()
            );
        }
        create_template_config(&path)?;
        return Ok(LoadResult::CreatedTemplate(path));
    }
    let cfg = load_config_from_xml_path(&path)?;
    Ok(LoadResult::Loaded(cfg, path))
}

// Map XmlConfig -> Config
fn xml_to_config(parsed: XmlConfig) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(dir) = non_empty(parsed.output_dir.as_deref()) {
        cfg.output_dir = PathBuf::from(dir);
    }
    if let Some(q) = non_empty(parsed.quarantine_path.as_deref()) {
        cfg.quarantine_path = q;
    }
    if let Some(n) = parsed.batch_size {
        cfg.batch_size = usize::try_from(n).context("batch_size out of range")?;
    }
    cfg.exclude = parsed
        .exclude
        .iter()
        .filter_map(|e| non_empty(Some(e)))
        .collect();
    cfg.scan_path = non_empty(parsed.scan_path.as_deref());
    if let Some(root) = non_empty(parsed.root_id.as_deref()) {
        cfg.root_id = root;
    }
    cfg.store_snapshot = non_empty(parsed.store_snapshot.as_deref()).map(PathBuf::from);
    if let Some(n) = parsed.retry_attempts {
        cfg.retry_attempts = u32::try_from(n).context("retry_attempts out of range")?;
    }
    if let Some(ms) = parsed.retry_base_ms {
        cfg.retry_base = Duration::from_millis(ms);
    }
    if let Some(ms) = parsed.batch_window_ms {
        cfg.batch_window = Duration::from_millis(ms);
    }
    if let Some(s) = non_empty(parsed.log_level.as_deref()) {
        cfg.log_level = s.parse::<LogLevel>().map_err(|e| anyhow!(e))?;
    }
    cfg.log_file = non_empty(parsed.log_file.as_deref()).map(PathBuf::from);
    Ok(cfg)
}

/// Load a Config from a specific XML file path (quick_xml).
pub fn load_config_from_xml_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config xml '{}'", path.display()))?;
    let parsed: XmlConfig = from_xml_str(&contents)
        .with_context(|| format!("parse config xml '{}'", path.display()))?;
    xml_to_config(parsed).with_context(|| format!("invalid value in config xml '{}'", path.display()))
}

/// Create default template config file and parent directory (best-effort permissions).
pub fn create_template_config(path: &Path) -> Result<()> {
    if path_has_symlink_ancestor(path)? {
        bail!(
            "Refusing to create config: ancestor of {} is a symlink",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        let _ = set_dir_mode_0700(parent);
    }

    let suggested_log = default_log_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "/path/to/drive_dedupe.log".into());
    let suggested_output = super::paths::default_output_dir();

    let content = format!(
        "<!--\n  drive_dedupe configuration (XML)\n\n  Fields:\n    output_dir        -> local directory for listing cache, decisions, reports and execution log\n    quarantine_path   -> store folder that receives relocated duplicates (never '/')\n    batch_size        -> mutating remote calls allowed per batch window\n    exclude           -> store path prefix to ignore; repeat the element for more\n    scan_path         -> only consider files at or below this store path (optional)\n    root_id           -> id of the store root folder\n    store_snapshot    -> JSON snapshot of the drive used as the store\n    retry_attempts    -> attempts per remote call on transient errors\n    retry_base_ms     -> first backoff delay; doubles per attempt\n    batch_window_ms   -> length of one rate window\n    log_level         -> quiet | normal | info | debug\n    log_file          -> path to log file (optional; stdout/stderr still used)\n\n  Notes:\n    - CLI flags override XML values.\n    - The quarantine folder is always excluded from scans.\n-->\n<config>\n  <output_dir>{}</output_dir>\n  <quarantine_path>{}</quarantine_path>\n  <batch_size>{}</batch_size>\n  <root_id>root</root_id>\n  <store_snapshot></store_snapshot>\n  <retry_attempts>{}</retry_attempts>\n  <retry_base_ms>{}</retry_base_ms>\n  <batch_window_ms>{}</batch_window_ms>\n  <log_level>normal</log_level>\n  <log_file>{}</log_file>\n</config>\n",
        suggested_output.display(),
        QUARANTINE_DEFAULT,
        BATCH_SIZE_DEFAULT,
        RETRY_ATTEMPTS_DEFAULT,
        RETRY_BASE_MS_DEFAULT,
        BATCH_WINDOW_MS_DEFAULT,
        suggested_log,
    );

    write_atomic_0600(path, content.as_bytes())?;
    info!("Created template config at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn template_round_trips_through_loader() {
        let td = tempdir().unwrap();
        let path = td.path().join("cfg").join("config.xml");
        create_template_config(&path).unwrap();
        let cfg = load_config_from_xml_path(&path).unwrap();
        assert_eq!(cfg.quarantine_path, QUARANTINE_DEFAULT);
        assert_eq!(cfg.batch_size, BATCH_SIZE_DEFAULT);
        assert_eq!(cfg.root_id, "root");
        assert!(cfg.store_snapshot.is_none());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let td = tempdir().unwrap();
        let path = td.path().join("config.xml");
        fs::write(&path, "<config><download_base>/x</download_base></config>").unwrap();
        let err = load_config_from_xml_path(&path).unwrap_err();
        assert!(format!("{err:#}").contains("unknown field"));
    }
}
