//! Remote store boundary.
//!
//! The transport itself (authentication, HTTP, pagination tokens) lives behind
//! [`DriveStore`]. Everything above this seam talks in `FileRecord`s and
//! folder ids and never sees provider-specific wire details.
//!
//! Implementations shipped here:
//! - [`MemoryStore`]: in-process store, used by tests and by the snapshot store.
//! - [`SnapshotStore`]: a JSON export of a drive listing, persisted after every
//!   mutation so the pipeline can run end-to-end offline.

mod memory;
mod retry;
mod snapshot;

pub use memory::{DEFAULT_ROOT_ID, MemoryStore, StoreOp};
pub use retry::RetryPolicy;
pub use snapshot::SnapshotStore;

use thiserror::Error;

use crate::errors::DedupeError;
use crate::model::{AuthScope, ChildEntry, ListPage};

/// Failures reported by a store implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The credential may list but not mutate.
    #[error("insufficient scope: {0}")]
    InsufficientScope(String),
    /// Rate limiting or a server-side error; worth retrying.
    #[error("transient provider error: {0}")]
    Transient(String),
    /// Retries for a transient error were used up.
    #[error("{op} failed after {attempts} attempt(s): {message}")]
    Exhausted {
        op: String,
        attempts: u32,
        message: String,
    },
    #[error("not found: {0}")]
    NotFound(String),
    /// The destination already holds an object with the requested name.
    #[error("name conflict: {0}")]
    Conflict(String),
    /// Any other non-retryable failure.
    #[error("provider error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<StoreError> for DedupeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InsufficientScope(scope) => DedupeError::AuthInsufficientScope { scope },
            StoreError::Transient(message) => DedupeError::TransientProvider {
                op: "request".into(),
                attempts: 1,
                message,
            },
            StoreError::Exhausted {
                op,
                attempts,
                message,
            } => DedupeError::TransientProvider {
                op,
                attempts,
                message,
            },
            StoreError::NotFound(id) => DedupeError::NotFound(id),
            StoreError::Conflict(name) => DedupeError::Conflict(name),
            StoreError::Other(msg) => DedupeError::Provider(msg),
        }
    }
}

/// The calls consumed from the transport layer.
///
/// Every call blocks until the remote side has committed (or failed); the
/// executor relies on that to append its log record only after the fact.
pub trait DriveStore {
    /// Id of the store root folder (the sentinel parent of top-level items).
    fn root_id(&self) -> &str;

    /// Permission level of the active credential.
    fn auth_scope(&self) -> Result<AuthScope, StoreError>;

    /// Fetch one listing page; `None` requests the first page.
    fn list_page(&mut self, page_token: Option<&str>) -> Result<ListPage, StoreError>;

    /// Direct children of a folder (used for name lookups).
    fn list_children(&mut self, folder_id: &str) -> Result<Vec<ChildEntry>, StoreError>;

    fn create_folder(&mut self, parent_id: &str, name: &str) -> Result<String, StoreError>;

    /// Reparent `id` under `new_parent_id`, replacing all previous parents.
    fn move_file(&mut self, id: &str, new_parent_id: &str) -> Result<(), StoreError>;

    fn rename_file(&mut self, id: &str, new_name: &str) -> Result<(), StoreError>;
}
