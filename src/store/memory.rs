//! In-process drive store.
//!
//! Holds a flat record list exactly like the remote listing and applies
//! folder creation, moves and renames to it. Failures can be injected per
//! operation so executor behaviour under provider errors is testable.

use std::collections::{HashMap, VecDeque};

use super::{DriveStore, StoreError};
use crate::model::{AuthScope, ChildEntry, FOLDER_MIME, FileRecord, ListPage};

pub const DEFAULT_ROOT_ID: &str = "root";
const DEFAULT_PAGE_SIZE: usize = 1000;

/// Store operation names used as fault-injection keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    List,
    Children,
    CreateFolder,
    Move,
    Rename,
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    root_id: String,
    scope: AuthScope,
    page_size: usize,
    records: Vec<FileRecord>,
    index: HashMap<String, usize>,
    faults: HashMap<(StoreOp, String), VecDeque<StoreError>>,
    reject_name_conflicts: bool,
    mutations: usize,
    next_folder: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT_ID, AuthScope::Full, Vec::new())
    }
}

impl MemoryStore {
    pub fn new(root_id: impl Into<String>, scope: AuthScope, records: Vec<FileRecord>) -> Self {
        let mut store = Self {
            root_id: root_id.into(),
            scope,
            page_size: DEFAULT_PAGE_SIZE,
            records: Vec::new(),
            index: HashMap::new(),
            faults: HashMap::new(),
            reject_name_conflicts: false,
            mutations: 0,
            next_folder: 0,
        };
        for r in records {
            store.insert(r);
        }
        store
    }

    pub fn with_records(records: Vec<FileRecord>) -> Self {
        Self::new(DEFAULT_ROOT_ID, AuthScope::Full, records)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_scope(mut self, scope: AuthScope) -> Self {
        self.scope = scope;
        self
    }

    /// Make moves/renames fail with `Conflict` when the target name is taken.
    pub fn with_strict_names(mut self) -> Self {
        self.reject_name_conflicts = true;
        self
    }

    /// Queue an error for the next call of `op` on `key`.
    ///
    /// Keys: the file id for moves/renames, the folder name for folder
    /// creation, the folder id for children lookups and the page token
    /// (`""` for the first page) for listing.
    pub fn inject_failure(&mut self, op: StoreOp, key: impl Into<String>, err: StoreError) {
        self.faults
            .entry((op, key.into()))
            .or_default()
            .push_back(err);
    }

    /// Insert or replace a record.
    pub fn insert(&mut self, record: FileRecord) {
        match self.index.get(&record.id) {
            Some(&pos) => self.records[pos] = record,
            None => {
                self.index.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&FileRecord> {
        self.index.get(id).map(|&pos| &self.records[pos])
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn scope(&self) -> AuthScope {
        self.scope
    }

    /// Number of committed mutating calls (folder creations, moves, renames).
    pub fn mutation_count(&self) -> usize {
        self.mutations
    }

    fn take_fault(&mut self, op: StoreOp, key: &str) -> Result<(), StoreError> {
        if let Some(queue) = self.faults.get_mut(&(op, key.to_string()))
            && let Some(err) = queue.pop_front()
        {
            return Err(err);
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        if self.scope.can_move() {
            Ok(())
        } else {
            Err(StoreError::InsufficientScope(self.scope.to_string()))
        }
    }

    fn ensure_folder(&self, id: &str) -> Result<(), StoreError> {
        if id == self.root_id || self.get(id).is_some_and(FileRecord::is_folder) {
            Ok(())
        } else {
            Err(StoreError::NotFound(id.to_string()))
        }
    }

    fn name_taken(&self, folder_id: &str, name: &str, except: &str) -> bool {
        self.records.iter().any(|r| {
            r.id != except && r.name == name && r.parent_ids.iter().any(|p| p == folder_id)
        })
    }
}

impl DriveStore for MemoryStore {
    fn root_id(&self) -> &str {
        &self.root_id
    }

    fn auth_scope(&self) -> Result<AuthScope, StoreError> {
        Ok(self.scope)
    }

    fn list_page(&mut self, page_token: Option<&str>) -> Result<ListPage, StoreError> {
        self.take_fault(StoreOp::List, page_token.unwrap_or(""))?;
        let start = match page_token {
            None => 0,
            Some(t) => t
                .parse::<usize>()
                .ok()
                .filter(|&n| n <= self.records.len())
                .ok_or_else(|| StoreError::Other(format!("invalid page token '{t}'")))?,
        };
        let end = (start + self.page_size).min(self.records.len());
        Ok(ListPage {
            records: self.records[start..end].to_vec(),
            next_page_token: (end < self.records.len()).then(|| end.to_string()),
        })
    }

    fn list_children(&mut self, folder_id: &str) -> Result<Vec<ChildEntry>, StoreError> {
        self.take_fault(StoreOp::Children, folder_id)?;
        self.ensure_folder(folder_id)?;
        Ok(self
            .records
            .iter()
            .filter(|r| r.parent_ids.iter().any(|p| p == folder_id))
            .map(|r| ChildEntry {
                id: r.id.clone(),
                name: r.name.clone(),
                is_folder: r.is_folder(),
            })
            .collect())
    }

    fn create_folder(&mut self, parent_id: &str, name: &str) -> Result<String, StoreError> {
        self.take_fault(StoreOp::CreateFolder, name)?;
        self.ensure_writable()?;
        self.ensure_folder(parent_id)?;
        // Snapshots reloaded from disk already hold earlier folder ids.
        let id = loop {
            self.next_folder += 1;
            let candidate = format!("folder-{}", self.next_folder);
            if !self.index.contains_key(&candidate) {
                break candidate;
            }
        };
        self.insert(FileRecord {
            id: id.clone(),
            name: name.to_string(),
            parent_ids: vec![parent_id.to_string()],
            fingerprint: None,
            size: 0,
            mime_type: FOLDER_MIME.to_string(),
            modified_time: chrono::Utc::now().to_rfc3339(),
        });
        self.mutations += 1;
        Ok(id)
    }

    fn move_file(&mut self, id: &str, new_parent_id: &str) -> Result<(), StoreError> {
        self.take_fault(StoreOp::Move, id)?;
        self.ensure_writable()?;
        self.ensure_folder(new_parent_id)?;
        let name = self
            .get(id)
            .map(|r| r.name.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if self.reject_name_conflicts && self.name_taken(new_parent_id, &name, id) {
            return Err(StoreError::Conflict(name));
        }
        let pos = self.index[id];
        self.records[pos].parent_ids = vec![new_parent_id.to_string()];
        self.mutations += 1;
        Ok(())
    }

    fn rename_file(&mut self, id: &str, new_name: &str) -> Result<(), StoreError> {
        self.take_fault(StoreOp::Rename, id)?;
        self.ensure_writable()?;
        let pos = *self
            .index
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if self.reject_name_conflicts {
            let parents = self.records[pos].parent_ids.clone();
            if parents.iter().any(|p| self.name_taken(p, new_name, id)) {
                return Err(StoreError::Conflict(new_name.to_string()));
            }
        }
        self.records[pos].name = new_name.to_string();
        self.mutations += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: &str, parent: &str) -> FileRecord {
        FileRecord {
            id: id.into(),
            name: format!("{id}.bin"),
            parent_ids: vec![parent.into()],
            fingerprint: Some("fp".into()),
            size: 1,
            mime_type: "application/octet-stream".into(),
            modified_time: String::new(),
        }
    }

    #[test]
    fn pages_cover_every_record_once() {
        let records: Vec<_> = (0..5).map(|i| file(&format!("f{i}"), "root")).collect();
        let mut store = MemoryStore::with_records(records).with_page_size(2);
        let mut seen = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = store.list_page(token.as_deref()).unwrap();
            seen.extend(page.records.into_iter().map(|r| r.id));
            match page.next_page_token {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        assert_eq!(seen, vec!["f0", "f1", "f2", "f3", "f4"]);
    }

    #[test]
    fn read_only_scope_rejects_mutations() {
        let mut store = MemoryStore::with_records(vec![file("a", "root")]).with_scope(AuthScope::ReadOnly);
        assert!(matches!(
            store.move_file("a", "root"),
            Err(StoreError::InsufficientScope(_))
        ));
        assert_eq!(store.mutation_count(), 0);
    }

    #[test]
    fn move_replaces_all_parents() {
        let mut store = MemoryStore::with_records(vec![file("a", "root")]);
        let folder = store.create_folder("root", "Q").unwrap();
        store.move_file("a", &folder).unwrap();
        assert_eq!(store.get("a").unwrap().parent_ids, vec![folder.clone()]);
        let children = store.list_children(&folder).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(store.mutation_count(), 2);
    }

    #[test]
    fn created_folder_ids_skip_existing_ones() {
        let mut existing = file("folder-1", "root");
        existing.mime_type = FOLDER_MIME.into();
        let mut store = MemoryStore::with_records(vec![existing]);
        let id = store.create_folder("root", "new").unwrap();
        assert_eq!(id, "folder-2");
        assert_eq!(store.get("folder-1").unwrap().name, "folder-1.bin");
    }

    #[test]
    fn injected_faults_fire_once() {
        let mut store = MemoryStore::with_records(vec![file("a", "root")]);
        store.inject_failure(StoreOp::Move, "a", StoreError::Transient("503".into()));
        assert!(store.move_file("a", "root").is_err());
        assert!(store.move_file("a", "root").is_ok());
    }
}
