//! Core library for `drive_dedupe`.
//!
//! Finds duplicate files in a cloud drive listing, records a keep/skip
//! decision per duplicate group, and relocates the non-kept copies into a
//! quarantine folder on the same drive.
//!
//! Pipeline:
//! - [`listing`]: fetch the full listing through a [`store::DriveStore`] (cached on disk).
//! - [`resolve`] + [`filter`]: turn parent chains into paths and apply scope/exclusions.
//! - [`grouping`]: bucket files by content fingerprint into stable duplicate groups.
//! - [`decisions`]: persistent per-group decisions, keyed by group signature.
//! - [`executor`]: plan and perform quarantine moves, journaled to an append-only log.
//!
//! The binary (`src/main.rs`) wires these together behind the CLI in [`cli`].

pub mod cli;
pub mod config;
pub mod decisions;
pub mod errors;
pub mod executor;
pub mod filter;
pub mod grouping;
pub mod listing;
pub mod model;
pub mod output;
pub mod platform;
pub mod report;
pub mod resolve;
pub mod scan;
pub mod shutdown;
pub mod store;

pub use config::types::{Config, LogLevel};
pub use config::{
    default_config_path, default_log_path, load_config_from_xml_path, path_has_symlink_ancestor,
};
pub use decisions::{Choice, Decision, DecisionState, DecisionStore};
pub use errors::DedupeError;
pub use executor::{ExecuteOptions, ExecutionLog, ExecutionReport, Plan, execute, plan};
pub use grouping::{DuplicateGroup, GroupSignature, GroupStatus, group};
pub use listing::ListingCache;
pub use model::{FileRecord, ResolvedFile};
pub use scan::{ScanReport, ScanScope, run_scan, scan_listing};
pub use store::{DriveStore, MemoryStore, RetryPolicy, SnapshotStore, StoreError};
