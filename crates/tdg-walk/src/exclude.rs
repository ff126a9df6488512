//! Exclusion matching: glob patterns applied to root-relative paths.

use glob::{MatchOptions, Pattern};

/// A compiled exclusion list. Patterns are matched against the full
/// root-relative POSIX path; `*` does not cross path separators.
pub struct ExcludeList {
    patterns: Vec<Pattern>,
    options: MatchOptions,
}

impl ExcludeList {
    pub fn new<S: AsRef<str>>(patterns: &[S], nocase: bool) -> Self {
        let compiled = patterns
            .iter()
            .filter_map(|raw| {
                // built-in defaults are written with a leading slash; matching
                // happens on relative paths
                let trimmed = raw.as_ref().trim_start_matches('/');
                match Pattern::new(trimmed) {
                    Ok(pattern) => Some(pattern),
                    Err(err) => {
                        tracing::warn!(pattern = trimmed, %err, "invalid exclusion pattern dropped");
                        None
                    }
                }
            })
            .collect();
        Self {
            patterns: compiled,
            options: MatchOptions {
                case_sensitive: !nocase,
                require_literal_separator: true,
                require_literal_leading_dot: false,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(rel_path, self.options))
    }
}
