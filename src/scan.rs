//! Scan pipeline: listing -> paths -> filter -> groups.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::errors::DedupeError;
use crate::filter::{PathFilter, normalize};
use crate::grouping::{DuplicateGroup, GroupStats, group};
use crate::listing::ListingCache;
use crate::model::ResolvedFile;
use crate::platform::write_atomic_0600;
use crate::resolve::PathResolver;
use crate::store::{DriveStore, RetryPolicy};

pub const SCAN_SCOPE_FILE: &str = "scan_scope.json";

/// Filter settings the last scan grouped with.
///
/// Every scan rewrites this file, so a scan without a scope clears the one
/// recorded before it. Later commands regroup the cached listing with it
/// and see the same groups, and signatures, the scan reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_path: Option<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl ScanScope {
    /// Normalized scope: blank scan paths drop out, prefixes are canonical and sorted.
    pub fn new<I, S>(scan_path: Option<&str>, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut exclude: Vec<String> = exclude.into_iter().map(|p| normalize(p.as_ref())).collect();
        exclude.sort();
        exclude.dedup();
        Self {
            scan_path: scan_path
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(normalize),
            exclude,
        }
    }

    pub fn file_path(dir: &Path) -> PathBuf {
        dir.join(SCAN_SCOPE_FILE)
    }

    pub fn filter(&self) -> PathFilter {
        PathFilter::new(&self.exclude).with_scope(self.scan_path.as_deref())
    }

    /// The scope recorded by the last scan in `dir`, if any.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = Self::file_path(dir);
        if !path.exists() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(&path).with_context(|| format!("read scan scope '{}'", path.display()))?;
        let scope: Self = serde_json::from_str(&content)
            .with_context(|| format!("parse scan scope '{}'", path.display()))?;
        debug!(path = %path.display(), scan_path = ?scope.scan_path, excluded = scope.exclude.len(), "Loaded scan scope");
        Ok(Some(scope))
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self).context("encode scan scope")?;
        write_atomic_0600(&Self::file_path(dir), &bytes)
    }
}

/// A record whose path could not be resolved; it takes no part in grouping.
#[derive(Debug, Clone, Serialize)]
pub struct Unresolved {
    pub id: String,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub fetched_at: String,
    pub total_records: usize,
    pub folders: usize,
    /// No fingerprint, or a workspace-native type.
    pub non_participating: usize,
    pub excluded: usize,
    pub out_of_scope: usize,
    pub eligible: usize,
    pub unresolved: Vec<Unresolved>,
    pub stats: GroupStats,
    #[serde(skip)]
    pub groups: Vec<DuplicateGroup>,
}

impl ScanReport {
    /// Look a group up by full signature or an unambiguous signature prefix.
    pub fn find_group(&self, signature: &str) -> Result<&DuplicateGroup, DedupeError> {
        if let Some(g) = self.groups.iter().find(|g| g.signature.as_str() == signature) {
            return Ok(g);
        }
        let mut matches = self
            .groups
            .iter()
            .filter(|g| !signature.is_empty() && g.signature.as_str().starts_with(signature));
        match (matches.next(), matches.next()) {
            (Some(g), None) => Ok(g),
            _ => Err(DedupeError::UnknownGroup(signature.to_string())),
        }
    }
}

/// Fetch (or reuse) the listing in `dir` and group it.
pub fn run_scan<S: DriveStore + ?Sized>(
    store: &mut S,
    dir: &Path,
    retry: &RetryPolicy,
    filter: &PathFilter,
    quarantine_root: &str,
    refresh: bool,
) -> Result<ScanReport> {
    let listing = ListingCache::fetch(store, dir, retry, refresh)?;
    Ok(scan_listing(&listing, store.root_id(), filter, quarantine_root))
}

/// Group a listing. The quarantine root is always excluded so relocated
/// files never re-enter grouping.
pub fn scan_listing(
    listing: &ListingCache,
    root_id: &str,
    filter: &PathFilter,
    quarantine_root: &str,
) -> ScanReport {
    let mut filter = filter.clone();
    filter.exclude(quarantine_root);

    let mut resolver = PathResolver::new(listing, root_id);
    let mut report = ScanReport {
        fetched_at: listing.fetched_at().to_string(),
        total_records: listing.len(),
        ..ScanReport::default()
    };
    let mut eligible = Vec::new();

    for record in listing.records() {
        if record.is_folder() {
            report.folders += 1;
            continue;
        }
        if !record.participates() {
            report.non_participating += 1;
            continue;
        }
        let path = match resolver.resolve(&record.id) {
            Ok(p) => p,
            Err(e) => {
                warn!(id = %record.id, name = %record.name, error = %e, "Could not resolve path; leaving file out of grouping");
                report.unresolved.push(Unresolved {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };
        if !filter.in_scope(&path) {
            report.out_of_scope += 1;
            continue;
        }
        if filter.is_excluded(&path) {
            report.excluded += 1;
            continue;
        }
        eligible.push(ResolvedFile {
            record: record.clone(),
            path,
        });
    }

    report.eligible = eligible.len();
    report.groups = group(eligible);
    report.stats = GroupStats::from_groups(&report.groups);
    info!(
        records = report.total_records,
        eligible = report.eligible,
        groups = report.stats.groups,
        uncertain = report.stats.uncertain,
        unresolved = report.unresolved.len(),
        savings = report.stats.savings,
        "Scan complete"
    );
    report
}
