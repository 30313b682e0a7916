//! Duplicate grouping by store-supplied fingerprint.
//!
//! Records are bucketed by exact (case-sensitive) fingerprint; singleton
//! buckets are dropped. A bucket whose members all have the same size is a
//! `duplicate` group, otherwise it is `uncertain` and only ever reported.
//!
//! Each group names one reference member (earliest modification time, ties
//! broken by id) and reports every other member as one reference→duplicate
//! pair: `n - 1` pairs for `n` members rather than all `n(n-1)/2`
//! combinations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::model::ResolvedFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Duplicate,
    Uncertain,
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GroupStatus::Duplicate => "duplicate",
            GroupStatus::Uncertain => "uncertain",
        })
    }
}

/// Stable identity of a group: SHA-256 over fingerprint, size and the sorted member ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupSignature(String);

impl GroupSignature {
    pub fn compute<'a, I>(fingerprint: &str, size: u64, member_ids: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut ids: Vec<&str> = member_ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();

        let mut hasher = Sha256::new();
        hasher.update(fingerprint.as_bytes());
        hasher.update([0u8]);
        hasher.update(size.to_be_bytes());
        for id in ids {
            hasher.update([0u8]);
            hasher.update(id.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for logs and terminal output.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for GroupSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for GroupSignature {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub signature: GroupSignature,
    pub fingerprint: String,
    /// Most common member size (smallest wins a tie).
    pub size: u64,
    pub status: GroupStatus,
    /// Reference member first, the rest in the same stable order.
    pub members: Vec<ResolvedFile>,
}

/// One reported reference→duplicate pair.
#[derive(Debug, Clone, Copy)]
pub struct Pair<'a> {
    pub reference: &'a ResolvedFile,
    pub duplicate: &'a ResolvedFile,
}

impl DuplicateGroup {
    pub fn reference(&self) -> &ResolvedFile {
        &self.members[0]
    }

    pub fn pairs(&self) -> impl Iterator<Item = Pair<'_>> {
        let reference = self.reference();
        self.members[1..].iter().map(move |duplicate| Pair {
            reference,
            duplicate,
        })
    }

    pub fn member(&self, id: &str) -> Option<&ResolvedFile> {
        self.members.iter().find(|m| m.id() == id)
    }

    pub fn member_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.members.iter().map(|m| m.id().to_string()).collect();
        ids.sort();
        ids
    }

    /// Bytes recoverable by keeping one copy; zero for uncertain groups.
    pub fn savings(&self) -> u64 {
        if self.status == GroupStatus::Uncertain {
            return 0;
        }
        let total: u64 = self.members.iter().map(|m| m.record.size).sum();
        let largest = self.members.iter().map(|m| m.record.size).max().unwrap_or(0);
        total - largest
    }
}

fn modified_key(file: &ResolvedFile) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&file.record.modified_time)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Stable member order: earliest modification first, unknown times last, ties by id.
fn stable_order(a: &ResolvedFile, b: &ResolvedFile) -> Ordering {
    match (modified_key(a), modified_key(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id().cmp(b.id()))
}

fn mode_size(members: &[ResolvedFile]) -> u64 {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for m in members {
        *counts.entry(m.record.size).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(sa, ca), (sb, cb)| ca.cmp(cb).then_with(|| sb.cmp(sa)))
        .map(|(size, _)| size)
        .unwrap_or(0)
}

/// Group eligible records into duplicate sets, sorted by signature.
///
/// Records without a fingerprint or of a workspace-native type are ignored.
pub fn group(records: impl IntoIterator<Item = ResolvedFile>) -> Vec<DuplicateGroup> {
    let mut buckets: BTreeMap<String, Vec<ResolvedFile>> = BTreeMap::new();
    for file in records {
        if !file.record.participates() {
            continue;
        }
        if let Some(fp) = file.record.fingerprint.clone() {
            buckets.entry(fp).or_default().push(file);
        }
    }

    let mut groups: Vec<DuplicateGroup> = buckets
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(fingerprint, mut members)| {
            members.sort_by(stable_order);
            let first_size = members[0].record.size;
            let status = if members.iter().all(|m| m.record.size == first_size) {
                GroupStatus::Duplicate
            } else {
                GroupStatus::Uncertain
            };
            let size = mode_size(&members);
            let signature =
                GroupSignature::compute(&fingerprint, size, members.iter().map(ResolvedFile::id));
            DuplicateGroup {
                signature,
                fingerprint,
                size,
                status,
                members,
            }
        })
        .collect();
    groups.sort_by(|a, b| a.signature.cmp(&b.signature));
    groups
}

/// Aggregate numbers for a grouping result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupStats {
    pub groups: usize,
    pub files: usize,
    pub pairs: usize,
    pub uncertain: usize,
    pub savings: u64,
}

impl GroupStats {
    pub fn from_groups(groups: &[DuplicateGroup]) -> Self {
        groups.iter().fold(Self::default(), |mut acc, g| {
            acc.groups += 1;
            acc.files += g.members.len();
            acc.pairs += g.members.len() - 1;
            if g.status == GroupStatus::Uncertain {
                acc.uncertain += 1;
            }
            acc.savings += g.savings();
            acc
        })
    }
}
