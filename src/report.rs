//! Produced artifacts: the duplicate report (CSV) and the decisions export (JSON).

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::decisions::ExportEntry;
use crate::grouping::DuplicateGroup;
use crate::platform::write_atomic_0600;

pub const REPORT_FILE: &str = "duplicates.csv";
pub const EXPORT_FILE: &str = "decisions_export.json";

/// One reference->duplicate pair.
#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    group_signature: &'a str,
    filename: &'a str,
    reference_path: &'a str,
    duplicate_path: &'a str,
    reference_modified: &'a str,
    duplicate_modified: &'a str,
    fingerprint: &'a str,
    size: u64,
    status: String,
}

/// Render the CSV duplicate report: one row per reported pair.
pub fn render_csv(groups: &[DuplicateGroup]) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for g in groups {
        for pair in g.pairs() {
            wtr.serialize(ReportRow {
                group_signature: g.signature.as_str(),
                filename: &pair.reference.record.name,
                reference_path: &pair.reference.path,
                duplicate_path: &pair.duplicate.path,
                reference_modified: &pair.reference.record.modified_time,
                duplicate_modified: &pair.duplicate.record.modified_time,
                fingerprint: &g.fingerprint,
                size: g.size,
                status: g.status.to_string(),
            })
            .context("encode report row")?;
        }
    }
    wtr.into_inner().context("flush CSV report")
}

/// Write the CSV report to `path`, replacing it atomically. Returns the row count.
pub fn write_duplicate_report(path: &Path, groups: &[DuplicateGroup]) -> Result<usize> {
    let bytes = render_csv(groups)?;
    write_atomic_0600(path, &bytes)
        .with_context(|| format!("write duplicate report '{}'", path.display()))?;
    let rows = groups.iter().map(|g| g.members.len() - 1).sum();
    info!(path = %path.display(), rows, "Wrote duplicate report");
    Ok(rows)
}

pub fn write_decisions_export(path: &Path, entries: &[ExportEntry]) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(entries).context("encode decisions export")?;
    write_atomic_0600(path, &bytes)
        .with_context(|| format!("write decisions export '{}'", path.display()))?;
    info!(path = %path.display(), entries = entries.len(), "Wrote decisions export");
    Ok(())
}

/// Human readable size with two decimals, 1024-based: `1536` -> `"1.50 KB"`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} PB")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::group;
    use crate::model::{FileRecord, ResolvedFile};

    fn rf(id: &str, fp: &str, size: u64, modified: &str, path: &str) -> ResolvedFile {
        ResolvedFile {
            record: FileRecord {
                id: id.into(),
                name: path.rsplit('/').next().unwrap_or(path).into(),
                parent_ids: vec![],
                fingerprint: Some(fp.into()),
                size,
                mime_type: "image/jpeg".into(),
                modified_time: modified.into(),
            },
            path: path.into(),
        }
    }

    #[test]
    fn csv_has_one_row_per_pair() {
        let groups = group(vec![
            rf("A", "x", 100, "2024-01-01T00:00:00Z", "/P/a.jpg"),
            rf("B", "x", 100, "2024-02-01T00:00:00Z", "/Q/b.jpg"),
            rf("C", "x", 100, "2024-03-01T00:00:00Z", "/R/c.jpg"),
        ]);
        let text = String::from_utf8(render_csv(&groups).unwrap()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("group_signature,filename,reference_path,duplicate_path"));
        assert!(lines[1].contains(",a.jpg,/P/a.jpg,/Q/b.jpg,"));
        assert!(lines[2].contains(",a.jpg,/P/a.jpg,/R/c.jpg,"));
        assert!(lines[1].ends_with(",x,100,duplicate"));
    }

    #[test]
    fn uncertain_status_is_reported() {
        let groups = group(vec![rf("s", "y", 50, "", "/s"), rf("t", "y", 60, "", "/t")]);
        let text = String::from_utf8(render_csv(&groups).unwrap()).unwrap();
        assert!(text.lines().nth(1).unwrap().ends_with(",uncertain"));
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(0), "0.00 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }
}
