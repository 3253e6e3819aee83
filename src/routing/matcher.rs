//! Path prefix matching.
//!
//! # Design Decisions
//! - Matching is case-sensitive and segment-aware: `/api/v2/app/` never
//!   matches `/api/v2/app2/key`
//! - The prefix itself without its trailing slash addresses the root key

/// Matches request paths under a backend prefix such as `/api/v2/etcd01/`.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// The prefix is normalized to end with exactly one `/`.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: format!("{}/", prefix.trim_end_matches('/')),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn matches(&self, path: &str) -> bool {
        self.strip(path).is_some()
    }

    /// Key path left after the prefix, always with a leading slash.
    pub fn strip(&self, path: &str) -> Option<String> {
        if let Some(rest) = path.strip_prefix(&self.prefix) {
            return Some(format!("/{rest}"));
        }
        (path == self.prefix.trim_end_matches('/')).then(|| "/".to_string())
    }
}
