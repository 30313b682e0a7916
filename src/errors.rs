//! Typed error definitions for drive_dedupe.
//! Provides a small set of well-known failure modes for better logs and tests.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DedupeError {
    #[error("Parent cycle detected while resolving '{start}' (revisited '{revisited}')")]
    PathCycle { start: String, revisited: String },

    #[error(
        "The active credential lacks move permission ({scope}); re-authenticate with full drive access and re-run"
    )]
    AuthInsufficientScope { scope: String },

    #[error("Provider error after {attempts} attempt(s) during {op}: {message}")]
    TransientProvider {
        op: String,
        attempts: u32,
        message: String,
    },

    #[error("Remote object not found: {0}")]
    NotFound(String),

    #[error("Name conflict in destination: {0}")]
    Conflict(String),

    #[error("Provider request failed: {0}")]
    Provider(String),

    #[error("Decision for group {0} was already exported; revise it explicitly")]
    DecisionLocked(String),

    #[error("File {keep_id} is not a member of group {signature}")]
    InvalidKeep { signature: String, keep_id: String },

    #[error("Unknown duplicate group: {0}")]
    UnknownGroup(String),

    #[error("Another execution already holds the lock at {0}")]
    ConcurrentRun(String),

    #[error("Operation interrupted by user")]
    Interrupted,
}

impl DedupeError {
    /// Stable numeric code for structured logs and exit handling.
    pub fn code(&self) -> u16 {
        match self {
            DedupeError::PathCycle { .. } => 10,
            DedupeError::AuthInsufficientScope { .. } => 20,
            DedupeError::TransientProvider { .. } => 21,
            DedupeError::NotFound(_) => 22,
            DedupeError::Conflict(_) => 23,
            DedupeError::Provider(_) => 24,
            DedupeError::DecisionLocked(_) => 30,
            DedupeError::InvalidKeep { .. } => 31,
            DedupeError::UnknownGroup(_) => 32,
            DedupeError::ConcurrentRun(_) => 40,
            DedupeError::Interrupted => 130,
        }
    }

    /// Short machine-readable kind for the `kind` log field.
    pub fn kind(&self) -> &'static str {
        match self {
            DedupeError::PathCycle { .. } => "path_cycle",
            DedupeError::AuthInsufficientScope { .. } => "auth_insufficient_scope",
            DedupeError::TransientProvider { .. } => "transient_provider",
            DedupeError::NotFound(_) => "not_found",
            DedupeError::Conflict(_) => "conflict",
            DedupeError::Provider(_) => "provider",
            DedupeError::DecisionLocked(_) => "decision_locked",
            DedupeError::InvalidKeep { .. } => "invalid_keep",
            DedupeError::UnknownGroup(_) => "unknown_group",
            DedupeError::ConcurrentRun(_) => "concurrent_run",
            DedupeError::Interrupted => "interrupted",
        }
    }
}
