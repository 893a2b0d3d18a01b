//! Name normalization for subsystems and flattened metric names.
//!
//! Every metric exposed by an exporter is named
//! `<namespace>_<subsystem>_<flattened_path>`. The subsystem is derived once
//! from the polled URL path, the flattened path from the JSON key-path of the
//! leaf. Both must end up as valid Prometheus identifiers.

use once_cell::sync::Lazy;
use regex::Regex;

/// Leading `/` and `_` in front of the first path segment.
static LEADING_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/?_?([^/_]+)").expect("leading segment regex is valid"));

/// Every further `/` together with an optional `_` after it.
static SEGMENT_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/_?([^/])").expect("segment separator regex is valid"));

/// Derives the subsystem identifier from an endpoint path.
///
/// `/_cluster/health` becomes `cluster_health`, `/_nodes/stats` becomes
/// `nodes_stats`. Query strings and trailing slashes are ignored. The
/// result keeps its case; characters that Prometheus does not accept are
/// replaced with `_`.
pub fn derive_subsystem(path: &str) -> String {
    let path = path.split('?').next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    let path = if trimmed.is_empty() { path } else { trimmed };

    let subsystem = LEADING_SEGMENT.replace(path, "${1}");
    let subsystem = SEGMENT_SEPARATOR.replace_all(&subsystem, "_${1}");

    sanitize(&subsystem)
}

/// Appends one key-path segment (object key or array index) to a prefix.
///
/// A single leading underscore of the joined result is dropped, so that the
/// JSON key `_shards` below the root yields `shards_total` for its child
/// `total` instead of `_shards_total`.
pub fn join_segment(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        return segment.to_string();
    }

    let joined = format!("{prefix}_{segment}");
    match joined.strip_prefix('_') {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => joined,
    }
}

/// Turns a joined key-path into the final metric name: lowercase, `[a-z0-9_]`.
pub fn metric_name(path: &str) -> String {
    sanitize(&path.to_lowercase())
}

/// Replaces every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Checks that `name` can be used as a metric name prefix (namespace).
pub fn is_valid_prefix(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
