//! Resource-version arithmetic for backends that assign versions themselves.
//!
//! Versions are decimal counters. A version that does not parse is treated as `1`, so a
//! malformed or legacy version always orders before any incremented one. This is permissive on
//! purpose: it never rejects a write because of a version it cannot read.

/// The version assigned when nothing has been stored yet.
pub const INITIAL: &str = "1";

fn parse(version: &str) -> u64 {
    version.parse().unwrap_or(1)
}

/// Returns the version to store after a write over `current`.
pub fn next(current: Option<&str>) -> String {
    match current {
        None | Some("") => INITIAL.to_string(),
        Some(v) => parse(v).saturating_add(1).to_string(),
    }
}

/// Returns true if `provided` orders strictly before `stored`.
pub fn is_stale(provided: &str, stored: &str) -> bool {
    parse(provided) < parse(stored)
}
