//! Collision-free destination names.
//!
//! Policy: keep the requested name when the destination folder does not hold
//! it yet; otherwise append " (n)" before the extension, n = 1, 2, ...
//!
//! Examples:
//! - "b.jpg" -> "b (1).jpg", "b (2).jpg", ...
//! - ".env" -> ".env (1)"
//! - "archive.tar.gz" -> "archive.tar (1).gz"
//!
//! The caller decides what "taken" means (existing children plus names
//! already claimed earlier in the run); this module only does the naming.

use tracing::{trace, warn};

const MAX_TRIES: u64 = 10_000;

/// Split a name into stem and extension. A leading dot does not start an extension.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(i) if i > 0 && i + 1 < name.len() => (&name[..i], Some(&name[i + 1..])),
        _ => (name, None),
    }
}

/// `name` with " (n)" inserted before the extension.
pub fn with_suffix(name: &str, n: u64) -> String {
    build_name(name, &format!(" ({n})"))
}

fn build_name(name: &str, suffix: &str) -> String {
    match split_extension(name) {
        (stem, Some(ext)) => format!("{stem}{suffix}.{ext}"),
        (stem, None) => format!("{stem}{suffix}"),
    }
}

/// First free name for `name`, with the suffix number used, if any.
/// `None` when every candidate is taken.
pub fn disambiguate(name: &str, taken: impl Fn(&str) -> bool) -> Option<(String, Option<u64>)> {
    if !taken(name) {
        return Some((name.to_string(), None));
    }
    let mut collisions = 0u32;
    for n in 1..=MAX_TRIES {
        let candidate = with_suffix(name, n);
        if !taken(&candidate) {
            return Some((candidate, Some(n)));
        }
        collisions = collisions.saturating_add(1);
        if collisions == 3 {
            trace!(name, "multiple name collisions, continuing to search unique suffix");
        }
    }
    // Folder crowded with numbered variants.
    let last = build_name(name, " (final)");
    if taken(&last) {
        warn!(name, tries = MAX_TRIES, "No free destination name left");
        return None;
    }
    Some((last, Some(MAX_TRIES + 1)))
}
