//! Listing cache.
//!
//! Holds the flat record set fetched from the store for one scan session.
//! A fetch writes a checkpoint after every page (`listing.partial.json`), so
//! an interrupted fetch resumes from the last committed page token instead of
//! starting over. A completed fetch is stored as `listing.json` and replaced
//! wholesale by the next full fetch; it is never edited in place.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::errors::DedupeError;
use crate::model::FileRecord;
use crate::platform::write_atomic_0600;
use crate::shutdown;
use crate::store::{DriveStore, RetryPolicy};

pub const LISTING_FILE: &str = "listing.json";
pub const CHECKPOINT_FILE: &str = "listing.partial.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingFile {
    version: u32,
    fetched_at: String,
    records: Vec<FileRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Checkpoint {
    version: u32,
    started_at: String,
    pages: u32,
    next_page_token: String,
    records: Vec<FileRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct ListingCache {
    fetched_at: String,
    records: Vec<FileRecord>,
    index: HashMap<String, usize>,
}

impl ListingCache {
    pub fn from_records(records: Vec<FileRecord>) -> Self {
        Self::build(chrono::Utc::now().to_rfc3339(), records)
    }

    fn build(fetched_at: String, records: Vec<FileRecord>) -> Self {
        let index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        Self {
            fetched_at,
            records,
            index,
        }
    }

    pub fn listing_path(dir: &Path) -> PathBuf {
        dir.join(LISTING_FILE)
    }

    pub fn checkpoint_path(dir: &Path) -> PathBuf {
        dir.join(CHECKPOINT_FILE)
    }

    /// Load the last completed listing from `dir`, if any.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = Self::listing_path(dir);
        if !path.exists() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(&path).with_context(|| format!("read listing '{}'", path.display()))?;
        let parsed: ListingFile = serde_json::from_str(&content)
            .with_context(|| format!("parse listing '{}'", path.display()))?;
        debug!(path = %path.display(), records = parsed.records.len(), "Loaded cached listing");
        Ok(Some(Self::build(parsed.fetched_at, parsed.records)))
    }

    /// Return the cached listing, or fetch it from the store.
    ///
    /// With `refresh` the previous listing and any checkpoint are discarded
    /// and the store is listed from page one.
    pub fn fetch<S: DriveStore + ?Sized>(
        store: &mut S,
        dir: &Path,
        retry: &RetryPolicy,
        refresh: bool,
    ) -> Result<Self> {
        let checkpoint_path = Self::checkpoint_path(dir);
        if refresh {
            remove_if_exists(&checkpoint_path)?;
            remove_if_exists(&Self::listing_path(dir))?;
        } else if !checkpoint_path.exists()
            && let Some(cached) = Self::load(dir)?
        {
            info!(records = cached.len(), fetched_at = %cached.fetched_at, "Using cached listing");
            return Ok(cached);
        }

        let mut progress = match load_checkpoint(&checkpoint_path) {
            Some(cp) => {
                info!(pages = cp.pages, records = cp.records.len(), "Resuming interrupted listing fetch");
                cp
            }
            None => Checkpoint {
                version: FORMAT_VERSION,
                started_at: chrono::Utc::now().to_rfc3339(),
                pages: 0,
                next_page_token: String::new(),
                records: Vec::new(),
            },
        };

        loop {
            if shutdown::is_requested() {
                return Err(DedupeError::Interrupted.into());
            }
            let token = (progress.pages > 0).then(|| progress.next_page_token.clone());
            let page = retry
                .run("list", || store.list_page(token.as_deref()))
                .map_err(DedupeError::from)?;
            progress.pages += 1;
            let fetched = page.records.len();
            progress.records.extend(page.records);
            info!(page = progress.pages, fetched, total = progress.records.len(), "Fetched listing page");

            match page.next_page_token {
                Some(next) => {
                    progress.next_page_token = next;
                    save_json(&checkpoint_path, &progress)?;
                }
                None => break,
            }
        }

        let listing = ListingFile {
            version: FORMAT_VERSION,
            fetched_at: chrono::Utc::now().to_rfc3339(),
            records: progress.records,
        };
        save_json(&Self::listing_path(dir), &listing)?;
        remove_if_exists(&checkpoint_path)?;
        Ok(Self::build(listing.fetched_at, listing.records))
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&FileRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn fetched_at(&self) -> &str {
        &self.fetched_at
    }
}

fn load_checkpoint(path: &Path) -> Option<Checkpoint> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Checkpoint>(&content) {
        Ok(cp) if cp.version == FORMAT_VERSION && cp.pages > 0 => Some(cp),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Ignoring unreadable listing checkpoint");
            None
        }
    }
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value).context("encode listing state")?;
    write_atomic_0600(path, &bytes)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove '{}'", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError, StoreOp};
    use tempfile::tempdir;

    fn file(id: &str) -> FileRecord {
        FileRecord {
            id: id.into(),
            name: format!("{id}.txt"),
            parent_ids: vec!["root".into()],
            fingerprint: Some(format!("fp-{id}")),
            size: 10,
            mime_type: "text/plain".into(),
            modified_time: "2024-01-01T00:00:00Z".into(),
        }
    }

    fn store_of(n: usize) -> MemoryStore {
        MemoryStore::with_records((0..n).map(|i| file(&format!("f{i}"))).collect()).with_page_size(2)
    }

    #[test]
    fn fetch_collects_all_pages_and_persists() {
        let td = tempdir().unwrap();
        let mut store = store_of(5);
        let cache = ListingCache::fetch(&mut store, td.path(), &RetryPolicy::immediate(1), false).unwrap();
        assert_eq!(cache.len(), 5);
        assert!(cache.get("f4").is_some());
        assert!(ListingCache::listing_path(td.path()).exists());
        assert!(!ListingCache::checkpoint_path(td.path()).exists());

        let loaded = ListingCache::load(td.path()).unwrap().unwrap();
        assert_eq!(loaded.records(), cache.records());
    }

    #[test]
    fn interrupted_fetch_resumes_from_checkpoint() {
        let td = tempdir().unwrap();
        let mut store = store_of(5);
        // Page two ("2") fails hard on the first pass.
        store.inject_failure(StoreOp::List, "2", StoreError::Other("boom".into()));
        assert!(ListingCache::fetch(&mut store, td.path(), &RetryPolicy::immediate(1), false).is_err());
        assert!(ListingCache::checkpoint_path(td.path()).exists());

        // First page must not be requested again.
        store.inject_failure(StoreOp::List, "", StoreError::Other("first page refetched".into()));
        let cache = ListingCache::fetch(&mut store, td.path(), &RetryPolicy::immediate(1), false).unwrap();
        let ids: Vec<_> = cache.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["f0", "f1", "f2", "f3", "f4"]);
    }

    #[test]
    fn refresh_replaces_previous_listing() {
        let td = tempdir().unwrap();
        let mut store = store_of(2);
        ListingCache::fetch(&mut store, td.path(), &RetryPolicy::immediate(1), false).unwrap();
        store.insert(file("new"));

        let cached = ListingCache::fetch(&mut store, td.path(), &RetryPolicy::immediate(1), false).unwrap();
        assert_eq!(cached.len(), 2, "cached listing reused without refresh");

        let fresh = ListingCache::fetch(&mut store, td.path(), &RetryPolicy::immediate(1), true).unwrap();
        assert_eq!(fresh.len(), 3);
    }

    #[test]
    fn transient_page_errors_are_retried() {
        let td = tempdir().unwrap();
        let mut store = store_of(3);
        store.inject_failure(StoreOp::List, "", StoreError::Transient("rate limited".into()));
        let cache = ListingCache::fetch(&mut store, td.path(), &RetryPolicy::immediate(3), false).unwrap();
        assert_eq!(cache.len(), 3);
    }
}
