//! Config module.
//! Provides configuration types, default paths, XML loading, and validation.

pub mod paths;
pub mod types;
mod validate;
pub mod xml;

pub use paths::{config_path, default_config_path, default_log_path, path_has_symlink_ancestor};
pub use types::{Config, LogLevel};
pub use xml::{LoadResult, create_template_config, load_config_from_xml_path, load_or_init};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "DRIVE_DEDUPE_CONFIG";

pub const QUARANTINE_DEFAULT: &str = "/_dupes";
pub const BATCH_SIZE_DEFAULT: usize = 100;
pub const RETRY_ATTEMPTS_DEFAULT: u32 = 5;
pub const RETRY_BASE_MS_DEFAULT: u64 = 1000;
pub const BATCH_WINDOW_MS_DEFAULT: u64 = 1000;
