//! Materialized department paths
//!
//! A path lists every ancestor id from the root down to the node itself,
//! delimited by `/` on both ends: `/1/4/9/`.

const SEPARATOR: char = '/';

/// Path of a node given its parent's path (`None` for a root)
pub fn path_for(parent_path: Option<&str>, id: i64) -> String {
    match parent_path {
        Some(parent) => format!("{}{}{}", parent, id, SEPARATOR),
        None => format!("{}{}{}", SEPARATOR, id, SEPARATOR),
    }
}

/// Ids encoded in a path, root first. `None` if the path is malformed.
pub fn segments(path: &str) -> Option<Vec<i64>> {
    let inner = path.strip_prefix(SEPARATOR)?.strip_suffix(SEPARATOR)?;
    if inner.is_empty() {
        return None;
    }
    inner
        .split(SEPARATOR)
        .map(|s| s.parse::<i64>().ok())
        .collect()
}

pub fn is_well_formed(path: &str) -> bool {
    segments(path).is_some()
}

/// Replace `old_prefix` at the start of `path` with `new_prefix`
pub fn rebase(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    path.strip_prefix(old_prefix)
        .map(|rest| format!("{}{}", new_prefix, rest))
}
