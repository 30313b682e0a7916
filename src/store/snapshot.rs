//! JSON snapshot store.
//!
//! A snapshot is a drive listing exported to disk:
//! `{"rootId": "root", "scope": "full", "records": [FileRecord...]}`.
//! Each mutation is applied to a copy of the in-memory store, written out
//! atomically, and only then adopted. A failed write leaves both the file
//! and the in-memory state as they were.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::memory::DEFAULT_ROOT_ID;
use super::{DriveStore, MemoryStore, StoreError};
use crate::model::{AuthScope, ChildEntry, FileRecord, ListPage};
use crate::platform::write_atomic_0600;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotFile {
    #[serde(default = "default_root")]
    root_id: String,
    #[serde(default = "default_scope")]
    scope: AuthScope,
    #[serde(default)]
    records: Vec<FileRecord>,
}

fn default_root() -> String {
    DEFAULT_ROOT_ID.to_string()
}

fn default_scope() -> AuthScope {
    AuthScope::ReadOnly
}

#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl SnapshotStore {
    /// Load a snapshot file.
    pub fn open(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("read store snapshot '{}'", path.display()))?;
        let parsed: SnapshotFile = serde_json::from_str(&content)
            .with_context(|| format!("parse store snapshot '{}'", path.display()))?;
        debug!(path = %path.display(), records = parsed.records.len(), scope = %parsed.scope, "Loaded store snapshot");
        Ok(Self {
            path: path.to_path_buf(),
            inner: MemoryStore::new(parsed.root_id, parsed.scope, parsed.records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &MemoryStore {
        &self.inner
    }

    /// Run `op` on a copy, persist the copy, then adopt it.
    fn commit<T>(
        &mut self,
        op: impl FnOnce(&mut MemoryStore) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut next = self.inner.clone();
        let out = op(&mut next)?;
        self.persist(&next)?;
        self.inner = next;
        Ok(out)
    }

    fn persist(&self, state: &MemoryStore) -> Result<(), StoreError> {
        let snapshot = SnapshotFile {
            root_id: state.root_id().to_string(),
            scope: state.scope(),
            records: state.records().to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| StoreError::Other(format!("encode snapshot: {e}")))?;
        write_atomic_0600(&self.path, &bytes)
            .map_err(|e| StoreError::Other(format!("write snapshot: {e:#}")))
    }
}

impl DriveStore for SnapshotStore {
    fn root_id(&self) -> &str {
        self.inner.root_id()
    }

    fn auth_scope(&self) -> Result<AuthScope, StoreError> {
        self.inner.auth_scope()
    }

    fn list_page(&mut self, page_token: Option<&str>) -> Result<ListPage, StoreError> {
        self.inner.list_page(page_token)
    }

    fn list_children(&mut self, folder_id: &str) -> Result<Vec<ChildEntry>, StoreError> {
        self.inner.list_children(folder_id)
    }

    fn create_folder(&mut self, parent_id: &str, name: &str) -> Result<String, StoreError> {
        self.commit(|s| s.create_folder(parent_id, name))
    }

    fn move_file(&mut self, id: &str, new_parent_id: &str) -> Result<(), StoreError> {
        self.commit(|s| s.move_file(id, new_parent_id))
    }

    fn rename_file(&mut self, id: &str, new_name: &str) -> Result<(), StoreError> {
        self.commit(|s| s.rename_file(id, new_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mutations_are_persisted() {
        let td = tempdir().unwrap();
        let path = td.path().join("drive.json");
        fs::write(
            &path,
            r#"{"rootId":"root","scope":"full","records":[
                {"id":"a","name":"a.jpg","parentIds":["root"],"fingerprint":"x","size":1,"mimeType":"image/jpeg","modifiedTime":""}
            ]}"#,
        )
        .unwrap();

        let mut store = SnapshotStore::open(&path).unwrap();
        let folder = store.create_folder("root", "_dupes").unwrap();
        store.move_file("a", &folder).unwrap();

        let reopened = SnapshotStore::open(&path).unwrap();
        assert_eq!(reopened.store().get("a").unwrap().parent_ids, vec![folder]);
    }

    #[test]
    fn failed_write_leaves_store_unchanged() {
        let td = tempdir().unwrap();
        let dir = td.path().join("state");
        fs::create_dir(&dir).unwrap();
        let path = dir.join("drive.json");
        fs::write(
            &path,
            r#"{"rootId":"root","scope":"full","records":[
                {"id":"F","name":"F","parentIds":["root"],"mimeType":"application/vnd.google-apps.folder"},
                {"id":"a","name":"a.jpg","parentIds":["root"],"fingerprint":"x","size":1,"mimeType":"image/jpeg","modifiedTime":""}
            ]}"#,
        )
        .unwrap();
        let mut store = SnapshotStore::open(&path).unwrap();

        // Replace the snapshot directory with a plain file so the write fails.
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, b"").unwrap();

        assert!(matches!(store.move_file("a", "F"), Err(StoreError::Other(_))));
        assert_eq!(store.store().get("a").unwrap().parent_ids, vec!["root".to_string()]);
        assert_eq!(store.store().mutation_count(), 0);
    }

    #[test]
    fn scope_defaults_to_read_only() {
        let td = tempdir().unwrap();
        let path = td.path().join("drive.json");
        fs::write(&path, r#"{"records":[]}"#).unwrap();
        let store = SnapshotStore::open(&path).unwrap();
        assert_eq!(store.auth_scope().unwrap(), AuthScope::ReadOnly);
        assert_eq!(store.root_id(), "root");
    }
}
