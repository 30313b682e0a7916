//! Per-run knowledge about destination folders.
//!
//! Folders are keyed by absolute path. An id of `None` marks a folder that
//! does not exist yet and would be created by a real run; dry runs keep such
//! entries so their name bookkeeping matches what a real run would see.

use std::collections::{HashMap, HashSet};

use crate::model::ChildEntry;
use crate::resolve::{ROOT_PATH, join};

#[derive(Debug, Default)]
pub(crate) struct FolderCache {
    ids: HashMap<String, Option<String>>,
    /// Names present in a folder, by folder path. Absent: not looked up yet.
    names: HashMap<String, HashSet<String>>,
    /// Names handed out earlier in this run.
    claimed: HashMap<String, HashSet<String>>,
}

impl FolderCache {
    pub fn new(root_id: &str) -> Self {
        let mut cache = Self::default();
        cache.ids.insert(ROOT_PATH.to_string(), Some(root_id.to_string()));
        cache
    }

    /// `Some(None)` for a known-missing folder, `None` when never looked up.
    pub fn get(&self, path: &str) -> Option<Option<&str>> {
        self.ids.get(path).map(Option::as_deref)
    }

    pub fn children_known(&self, path: &str) -> bool {
        self.names.contains_key(path)
    }

    /// Store a children listing of `path`; sub-folders become known paths.
    pub fn record_children(&mut self, path: &str, children: &[ChildEntry]) {
        let names = self.names.entry(path.to_string()).or_default();
        for child in children {
            names.insert(child.name.clone());
            if child.is_folder {
                self.ids
                    .entry(join(path, &child.name))
                    .or_insert_with(|| Some(child.id.clone()));
            }
        }
    }

    /// Register a folder that was just created (`Some`) or would be (`None`).
    /// It starts out empty.
    pub fn insert_folder(&mut self, parent: &str, name: &str, id: Option<String>) {
        let path = join(parent, name);
        if let Some(names) = self.names.get_mut(parent) {
            names.insert(name.to_string());
        }
        self.names.entry(path.clone()).or_default();
        self.ids.insert(path, id);
    }

    /// Forget the children listing of `path` so the next lookup refetches it.
    pub fn invalidate_children(&mut self, path: &str) {
        self.names.remove(path);
    }

    pub fn is_taken(&self, path: &str, name: &str) -> bool {
        self.names.get(path).is_some_and(|n| n.contains(name))
            || self.claimed.get(path).is_some_and(|n| n.contains(name))
    }

    pub fn claim(&mut self, path: &str, name: &str) {
        self.claimed
            .entry(path.to_string())
            .or_default()
            .insert(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(id: &str, name: &str, is_folder: bool) -> ChildEntry {
        ChildEntry {
            id: id.into(),
            name: name.into(),
            is_folder,
        }
    }

    #[test]
    fn children_listing_registers_subfolders() {
        let mut c = FolderCache::new("root");
        assert_eq!(c.get("/"), Some(Some("root")));
        assert_eq!(c.get("/_dupes"), None);
        c.record_children("/", &[child("d1", "_dupes", true), child("f", "x.txt", false)]);
        assert_eq!(c.get("/_dupes"), Some(Some("d1")));
        assert_eq!(c.get("/x.txt"), None);
        assert!(c.is_taken("/", "x.txt"));
    }

    #[test]
    fn pending_folders_start_empty() {
        let mut c = FolderCache::new("root");
        c.insert_folder("/", "_dupes", None);
        assert_eq!(c.get("/_dupes"), Some(None));
        assert!(c.children_known("/_dupes"));
        assert!(!c.is_taken("/_dupes", "b.jpg"));
        c.claim("/_dupes", "b.jpg");
        assert!(c.is_taken("/_dupes", "b.jpg"));
    }

    #[test]
    fn invalidation_keeps_claims() {
        let mut c = FolderCache::new("root");
        c.record_children("/Q", &[child("f", "b.jpg", false)]);
        c.claim("/Q", "b (1).jpg");
        c.invalidate_children("/Q");
        assert!(!c.children_known("/Q"));
        assert!(!c.is_taken("/Q", "b.jpg"));
        assert!(c.is_taken("/Q", "b (1).jpg"));
    }
}
