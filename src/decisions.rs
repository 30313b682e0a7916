//! Operator decisions, keyed by group signature.
//!
//! Decisions outlive scans. A re-scan that changes a group's membership
//! changes its signature, so the old decision no longer matches; it is
//! reported as stale (found through the shared fingerprint) and must be
//! decided again rather than silently reused.
//!
//! Every change is written through immediately. Saving re-reads the file
//! first and keeps entries this process has never seen, so two sessions
//! recording different groups do not erase each other's work. The merged
//! result replaces the file atomically.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::errors::DedupeError;
use crate::grouping::{DuplicateGroup, GroupSignature};
use crate::platform::write_atomic_0600;

pub const DECISIONS_FILE: &str = "decisions.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Keep,
    Skip,
}

/// What the operator chose for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    /// Keep this member; every other member is relocated.
    Keep(String),
    /// Leave the whole group alone.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    #[serde(rename = "groupSignature")]
    pub signature: GroupSignature,
    pub fingerprint: String,
    #[serde(default)]
    pub size: u64,
    /// Group membership at decision time, sorted.
    #[serde(default)]
    pub member_ids: Vec<String>,
    pub action: DecisionAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_id: Option<String>,
    pub decided_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,
}

impl Decision {
    pub fn is_exported(&self) -> bool {
        self.exported_at.is_some()
    }

    pub fn kept(&self) -> Option<&str> {
        match self.action {
            DecisionAction::Keep => self.keep_id.as_deref(),
            DecisionAction::Skip => None,
        }
    }
}

/// How a stored decision relates to a freshly scanned group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionState<'a> {
    Fresh(&'a Decision),
    Stale(&'a Decision),
    Pending,
}

/// One entry of the decisions export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEntry {
    pub group_signature: GroupSignature,
    pub kept_id: String,
    pub discarded_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecisionStats {
    pub decided: usize,
    pub skipped: usize,
    pub pending: usize,
    pub stale: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DecisionsFile {
    version: u32,
    decisions: Vec<Decision>,
}

#[derive(Debug)]
pub struct DecisionStore {
    path: PathBuf,
    decisions: BTreeMap<GroupSignature, Decision>,
    /// Signatures replaced in this session; never resurrected by a merge.
    removed: HashSet<GroupSignature>,
}

impl DecisionStore {
    /// Open the store kept in `dir`. A missing file yields an empty store.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(DECISIONS_FILE);
        let decisions = read_file(&path)?
            .into_iter()
            .map(|d| (d.signature.clone(), d))
            .collect::<BTreeMap<_, _>>();
        debug!(path = %path.display(), count = decisions.len(), "Opened decision store");
        Ok(Self {
            path,
            decisions,
            removed: HashSet::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_decision(&self, signature: &str) -> Option<&Decision> {
        self.decisions.get(&GroupSignature::from(signature.to_string()))
    }

    pub fn all_decisions(&self) -> Vec<Decision> {
        self.decisions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    /// Record a choice for `group`.
    ///
    /// Fails with `DecisionLocked` when the current decision for this exact
    /// group was already exported; use [`revise_decision`](Self::revise_decision)
    /// for that. A stale decision for the same fingerprint is replaced.
    pub fn record_decision(&mut self, group: &DuplicateGroup, choice: Choice) -> Result<&Decision> {
        if let Some(existing) = self.decisions.get(&group.signature)
            && existing.is_exported()
        {
            return Err(DedupeError::DecisionLocked(group.signature.to_string()).into());
        }
        self.put(group, choice)
    }

    /// Replace a decision even if it was exported; the export stamp is cleared.
    pub fn revise_decision(&mut self, group: &DuplicateGroup, choice: Choice) -> Result<&Decision> {
        self.put(group, choice)
    }

    fn put(&mut self, group: &DuplicateGroup, choice: Choice) -> Result<&Decision> {
        let (action, keep_id) = match choice {
            Choice::Keep(id) => {
                if group.member(&id).is_none() {
                    return Err(DedupeError::InvalidKeep {
                        signature: group.signature.to_string(),
                        keep_id: id,
                    }
                    .into());
                }
                (DecisionAction::Keep, Some(id))
            }
            Choice::Skip => (DecisionAction::Skip, None),
        };

        let stale: Vec<GroupSignature> = self
            .decisions
            .values()
            .filter(|d| d.fingerprint == group.fingerprint && d.signature != group.signature)
            .map(|d| d.signature.clone())
            .collect();
        for sig in stale {
            debug!(old = %sig.short(), new = %group.signature.short(), "Replacing stale decision");
            self.decisions.remove(&sig);
            self.removed.insert(sig);
        }

        let decision = Decision {
            signature: group.signature.clone(),
            fingerprint: group.fingerprint.clone(),
            size: group.size,
            member_ids: group.member_ids(),
            action,
            keep_id,
            decided_at: chrono::Utc::now().to_rfc3339(),
            exported_at: None,
        };
        info!(signature = %decision.signature.short(), action = ?decision.action, keep = ?decision.keep_id, "Recorded decision");
        self.removed.remove(&group.signature);
        self.decisions.insert(group.signature.clone(), decision);
        self.flush()?;
        self.decisions
            .get(&group.signature)
            .ok_or_else(|| DedupeError::UnknownGroup(group.signature.to_string()).into())
    }

    /// Classify the stored decision (if any) for a scanned group.
    pub fn state_for(&self, group: &DuplicateGroup) -> DecisionState<'_> {
        if let Some(d) = self.decisions.get(&group.signature) {
            return match d.kept() {
                Some(id) if group.member(id).is_none() => DecisionState::Stale(d),
                _ => DecisionState::Fresh(d),
            };
        }
        self.decisions
            .values()
            .filter(|d| d.fingerprint == group.fingerprint)
            .max_by(|a, b| a.decided_at.cmp(&b.decided_at))
            .map_or(DecisionState::Pending, DecisionState::Stale)
    }

    pub fn stats(&self, groups: &[DuplicateGroup]) -> DecisionStats {
        let mut stats = DecisionStats::default();
        for g in groups {
            match self.state_for(g) {
                DecisionState::Fresh(d) if d.action == DecisionAction::Skip => stats.skipped += 1,
                DecisionState::Fresh(_) => stats.decided += 1,
                DecisionState::Stale(_) => stats.stale += 1,
                DecisionState::Pending => stats.pending += 1,
            }
        }
        stats
    }

    /// Build the decisions export for `groups` and stamp the exported decisions.
    ///
    /// Only fresh keep decisions are exported; skipped, stale and pending
    /// groups are left out.
    pub fn export(&mut self, groups: &[DuplicateGroup]) -> Result<Vec<ExportEntry>> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut entries = Vec::new();
        let mut stamped = Vec::new();
        for g in groups {
            let DecisionState::Fresh(d) = self.state_for(g) else {
                continue;
            };
            let Some(kept) = d.kept() else {
                continue;
            };
            entries.push(ExportEntry {
                group_signature: g.signature.clone(),
                kept_id: kept.to_string(),
                discarded_ids: g
                    .members
                    .iter()
                    .map(|m| m.id().to_string())
                    .filter(|id| id != kept)
                    .collect(),
            });
            if !d.is_exported() {
                stamped.push(g.signature.clone());
            }
        }
        for sig in &stamped {
            if let Some(d) = self.decisions.get_mut(sig) {
                d.exported_at = Some(now.clone());
            }
        }
        if !stamped.is_empty() {
            self.flush()?;
        }
        info!(exported = entries.len(), newly_stamped = stamped.len(), "Exported decisions");
        Ok(entries)
    }

    /// Load-merge-save: keep on-disk entries unknown here, then replace the file.
    pub fn flush(&mut self) -> Result<()> {
        for d in read_file(&self.path)? {
            if !self.removed.contains(&d.signature) && !self.decisions.contains_key(&d.signature) {
                debug!(signature = %d.signature.short(), "Merged decision recorded elsewhere");
                self.decisions.insert(d.signature.clone(), d);
            }
        }
        let file = DecisionsFile {
            version: FORMAT_VERSION,
            decisions: self.decisions.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&file).context("encode decisions")?;
        write_atomic_0600(&self.path, &bytes)
            .with_context(|| format!("write decisions '{}'", self.path.display()))
    }
}

fn read_file(path: &Path) -> Result<Vec<Decision>> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("read decisions '{}'", path.display())),
    };
    let parsed: DecisionsFile = serde_json::from_str(&content)
        .with_context(|| format!("parse decisions '{}'", path.display()))?;
    if parsed.version != FORMAT_VERSION {
        warn!(found = parsed.version, expected = FORMAT_VERSION, "Unexpected decisions file version");
    }
    Ok(parsed.decisions)
}
