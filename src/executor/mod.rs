//! Move executor.
//!
//! Plans relocations of non-kept duplicates into the quarantine folder and
//! performs them (or reports what would happen, for dry runs). Outcomes go to
//! an append-only execution log that also makes re-runs idempotent.

mod folders;
pub mod journal;
pub mod lock;
pub mod naming;
pub mod plan;
pub mod run;

pub use journal::{EXECUTION_LOG_FILE, ExecutionLog, ExecutionRecord, RecordStatus};
pub use lock::ExecutionLock;
pub use plan::{Plan, PlanSummary, destination, plan};
pub use run::{ExecuteOptions, ExecutionReport, execute};
