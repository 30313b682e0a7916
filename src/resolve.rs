//! Path resolution over a flat parent-pointer listing.
//!
//! Policy:
//! - Multi-parented records follow their FIRST listed parent. This is a
//!   best-effort heuristic: the store does not rank parents, so the chosen
//!   path may differ from the one an operator has in mind.
//! - The walk stops at a record without parents, whose parent is the root
//!   sentinel, or whose parent is not part of the listing; such a record
//!   lives directly under `/`.
//! - A revisited id aborts the walk with `DedupeError::PathCycle`; nothing
//!   from a failed walk is memoized.
//!
//! Every node on a successful walk is memoized, so sibling lookups only pay
//! for the part of the chain not seen before.

use std::collections::{HashMap, HashSet};
use tracing::trace;

use crate::errors::DedupeError;
use crate::listing::ListingCache;

pub const ROOT_PATH: &str = "/";
pub const SEPARATOR: char = '/';

#[derive(Debug)]
pub struct PathResolver<'a> {
    listing: &'a ListingCache,
    root_id: String,
    memo: HashMap<String, String>,
}

impl<'a> PathResolver<'a> {
    pub fn new(listing: &'a ListingCache, root_id: impl Into<String>) -> Self {
        Self {
            listing,
            root_id: root_id.into(),
            memo: HashMap::new(),
        }
    }

    /// Absolute path of record `id`. Unknown ids and the root sentinel resolve to `/`.
    pub fn resolve(&mut self, id: &str) -> Result<String, DedupeError> {
        if let Some(p) = self.memo.get(id) {
            return Ok(p.clone());
        }
        if id == self.root_id || self.listing.get(id).is_none() {
            return Ok(ROOT_PATH.to_string());
        }

        let listing = self.listing;
        let mut chain: Vec<&'a str> = Vec::new();
        let mut visited: HashSet<&'a str> = HashSet::new();
        let mut cur: &'a str = match listing.get(id) {
            Some(r) => r.id.as_str(),
            None => return Ok(ROOT_PATH.to_string()),
        };

        let mut base = loop {
            if let Some(known) = self.memo.get(cur) {
                break known.clone();
            }
            if !visited.insert(cur) {
                return Err(DedupeError::PathCycle {
                    start: id.to_string(),
                    revisited: cur.to_string(),
                });
            }
            chain.push(cur);
            let parent = listing.get(cur).and_then(|r| r.primary_parent());
            match parent {
                Some(p) if p != self.root_id => match listing.get(p) {
                    Some(parent_rec) => cur = parent_rec.id.as_str(),
                    None => break ROOT_PATH.to_string(),
                },
                _ => break ROOT_PATH.to_string(),
            }
        };

        for node in chain.into_iter().rev() {
            let name = listing.get(node).map(|r| r.name.as_str()).unwrap_or_default();
            base = join(&base, name);
            self.memo.insert(node.to_string(), base.clone());
        }
        trace!(id, path = %base, "resolved path");
        self.memo
            .get(id)
            .cloned()
            .ok_or_else(|| DedupeError::NotFound(id.to_string()))
    }

    /// Drop all memoized paths.
    pub fn clear(&mut self) {
        self.memo.clear();
    }

    pub fn memoized(&self) -> usize {
        self.memo.len()
    }
}

/// Append one name to an absolute path.
pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH || parent.is_empty() {
        format!("{SEPARATOR}{name}")
    } else {
        format!("{parent}{SEPARATOR}{name}")
    }
}

/// Split an absolute path into its folder part and final name.
/// `"/a/b.jpg"` -> `("/a", "b.jpg")`, `"/b.jpg"` -> `("/", "b.jpg")`.
pub fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind(SEPARATOR) {
        Some(0) => (ROOT_PATH, &path[1..]),
        Some(i) => (&path[..i], &path[i + 1..]),
        None => (ROOT_PATH, path),
    }
}

/// Non-empty segments of an absolute path.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}
