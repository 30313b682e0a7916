//! User-facing terminal output.
//! Colors are enabled only when stdout is a TTY; logs go through `tracing` instead.

use owo_colors::OwoColorize;

use crate::executor::{ExecutionRecord, RecordStatus};
use crate::grouping::{DuplicateGroup, GroupStatus};
use crate::report::format_size;

fn is_tty() -> bool {
    atty::is(atty::Stream::Stdout)
}

pub fn print_info(msg: &str) {
    if is_tty() {
        println!("{} {}", "info:".cyan().bold(), msg);
    } else {
        println!("info: {msg}");
    }
}

pub fn print_warn(msg: &str) {
    if is_tty() {
        eprintln!("{} {}", "warn:".yellow().bold(), msg);
    } else {
        eprintln!("warn: {msg}");
    }
}

pub fn print_error(msg: &str) {
    if is_tty() {
        eprintln!("{} {}", "error:".red().bold(), msg);
    } else {
        eprintln!("error: {msg}");
    }
}

pub fn print_success(msg: &str) {
    if is_tty() {
        println!("{} {}", "ok:".green().bold(), msg);
    } else {
        println!("ok: {msg}");
    }
}

/// Print a plain line (no prefix) for output users may script against.
pub fn print_user(msg: &str) {
    println!("{msg}");
}

/// One group: signature, status and members, reference first.
pub fn print_group(group: &DuplicateGroup, tag: &str) {
    let status = group.status.to_string();
    let header = format!(
        "{}  {}  {} file(s) of {}  [{}]",
        group.signature.short(),
        status,
        group.members.len(),
        format_size(group.size),
        tag
    );
    if is_tty() {
        match group.status {
            GroupStatus::Duplicate => println!("{}", header.bold()),
            GroupStatus::Uncertain => println!("{}", header.yellow().bold()),
        }
    } else {
        println!("{header}");
    }
    for (i, m) in group.members.iter().enumerate() {
        let marker = if i == 0 { "*" } else { " " };
        println!(
            "  {marker} {:<24} {:>12}  {}  {}",
            m.id(),
            format_size(m.record.size),
            m.record.modified_time,
            m.path
        );
    }
}

/// One execution record as `status  source -> dest (note)`.
pub fn print_record(rec: &ExecutionRecord) {
    let status = format!("{:<8}", rec.status.to_string());
    let mut line = format!("{}  ->  {}", rec.source_path, rec.dest_path);
    if let Some(note) = &rec.note {
        line.push_str(&format!("  ({note})"));
    }
    if let Some(err) = &rec.error {
        line.push_str(&format!("  [{err}]"));
    }
    let status = if is_tty() {
        match rec.status {
            RecordStatus::Moved => status.green().to_string(),
            RecordStatus::Skipped => status.dimmed().to_string(),
            RecordStatus::Failed => status.red().bold().to_string(),
            RecordStatus::Planned => status.cyan().to_string(),
        }
    } else {
        status
    };
    println!("{status}  {line}");
}
