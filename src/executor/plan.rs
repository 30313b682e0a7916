//! Turning groups and decisions into planned relocations.

use serde::Serialize;
use tracing::debug;

use super::journal::ExecutionRecord;
use crate::decisions::{DecisionState, DecisionStore};
use crate::filter::normalize;
use crate::grouping::{DuplicateGroup, GroupStatus};
use crate::resolve::{join, segments};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub groups: usize,
    /// Groups with a fresh keep decision.
    pub actionable: usize,
    pub skipped_groups: usize,
    pub pending: usize,
    pub stale: usize,
    /// Actionable groups whose member sizes differ.
    pub uncertain: usize,
    pub files: usize,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub run_id: String,
    pub quarantine_root: String,
    pub records: Vec<ExecutionRecord>,
    pub summary: PlanSummary,
}

pub fn new_run_id() -> String {
    format!("run-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ"))
}

/// Quarantine destination for `source_path`, keeping the whole folder chain.
/// `/_dupes` + `/Q/b.jpg` -> `/_dupes/Q/b.jpg`.
pub fn destination(quarantine_root: &str, source_path: &str) -> String {
    segments(source_path).fold(normalize(quarantine_root), |acc, seg| join(&acc, seg))
}

/// Plan one relocation per non-kept member of every group with a fresh keep decision.
///
/// Groups are visited in signature order and members in their stable order,
/// so unchanged input always yields the same record sequence.
pub fn plan(groups: &[DuplicateGroup], decisions: &DecisionStore, quarantine_root: &str) -> Plan {
    let run_id = new_run_id();
    let quarantine_root = normalize(quarantine_root);
    let mut ordered: Vec<&DuplicateGroup> = groups.iter().collect();
    ordered.sort_by(|a, b| a.signature.cmp(&b.signature));

    let mut summary = PlanSummary {
        groups: ordered.len(),
        ..PlanSummary::default()
    };
    let mut records = Vec::new();
    for g in ordered {
        let kept = match decisions.state_for(g) {
            DecisionState::Fresh(d) => match d.kept() {
                Some(id) => id.to_string(),
                None => {
                    summary.skipped_groups += 1;
                    continue;
                }
            },
            DecisionState::Stale(_) => {
                summary.stale += 1;
                continue;
            }
            DecisionState::Pending => {
                summary.pending += 1;
                continue;
            }
        };
        summary.actionable += 1;
        if g.status == GroupStatus::Uncertain {
            summary.uncertain += 1;
        }
        for m in g.members.iter().filter(|m| m.id() != kept) {
            let dest = destination(&quarantine_root, &m.path);
            debug!(file_id = %m.id(), source = %m.path, dest = %dest, "Planned relocation");
            records.push(ExecutionRecord::planned(&run_id, m.id(), &m.path, &dest));
            summary.files += 1;
        }
    }
    Plan {
        run_id,
        quarantine_root,
        records,
        summary,
    }
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
