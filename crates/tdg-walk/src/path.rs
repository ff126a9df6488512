//! Path normalization: every path in a report is POSIX-style and relative to
//! the scan root.

use std::path::Path;

/// Convert a path string to forward slashes.
pub fn unixify_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Path relative to the scan root, forward-slashed, with no leading or
/// trailing separator. Paths outside the root are returned unmodified
/// (normalized) rather than failing.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let rel = unixify_path(&rel.to_string_lossy());
    if rel == "/" {
        return rel;
    }
    rel.trim_matches('/').to_string()
}

/// Root path rendered as an output-file suffix: drive colons become `$`,
/// separators become `_`.
pub fn root_suffix(root: &str) -> String {
    unixify_path(root).replace(':', "$").replace('/', "_")
}
