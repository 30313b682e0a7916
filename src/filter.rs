//! Path-prefix filtering applied before grouping.
//!
//! Prefixes are normalized to canonical absolute form (leading `/`, no
//! trailing `/`, no empty segments). A prefix matches the path itself and
//! everything below it, never a sibling that merely shares leading
//! characters: `/A` matches `/A` and `/A/x`, not `/AB`.

use crate::resolve::{ROOT_PATH, SEPARATOR, segments};

/// Canonical absolute form of a store path.
pub fn normalize(path: &str) -> String {
    let mut out = String::new();
    for seg in segments(path.trim()) {
        out.push(SEPARATOR);
        out.push_str(seg);
    }
    if out.is_empty() {
        ROOT_PATH.to_string()
    } else {
        out
    }
}

/// True if `path` equals `prefix` or lies below it. Both must be normalized.
pub fn is_under(path: &str, prefix: &str) -> bool {
    if prefix == ROOT_PATH {
        return true;
    }
    path == prefix
        || (path.starts_with(prefix) && path[prefix.len()..].starts_with(SEPARATOR))
}

#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    excluded: Vec<String>,
    scope: Option<String>,
}

impl PathFilter {
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut excluded: Vec<String> = excluded
            .into_iter()
            .map(|p| normalize(p.as_ref()))
            .collect();
        excluded.sort();
        excluded.dedup();
        Self {
            excluded,
            scope: None,
        }
    }

    /// Restrict eligibility to paths at or below `scope`.
    pub fn with_scope(mut self, scope: Option<&str>) -> Self {
        self.scope = scope
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(normalize);
        self
    }

    pub fn exclude(&mut self, prefix: &str) {
        let p = normalize(prefix);
        if let Err(pos) = self.excluded.binary_search(&p) {
            self.excluded.insert(pos, p);
        }
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        let path = normalize(path);
        self.excluded.iter().any(|prefix| is_under(&path, prefix))
    }

    pub fn in_scope(&self, path: &str) -> bool {
        match &self.scope {
            Some(scope) => is_under(&normalize(path), scope),
            None => true,
        }
    }

    /// Combined test used by the scan pipeline.
    pub fn admits(&self, path: &str) -> bool {
        self.in_scope(path) && !self.is_excluded(path)
    }

    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}
