//! Route lookup.
//!
//! # Responsibilities
//! - Store one route per backend prefix
//! - Resolve a request path to its target and key
//!
//! # Design Decisions
//! - Immutable after construction (shared without locks)
//! - Longest prefix wins, so nested ids never shadow each other
//! - Explicit `None` rather than a silent default

use std::sync::Arc;

use crate::routing::matcher::PathPrefixMatcher;

#[derive(Debug)]
struct Route<T> {
    matcher: PathPrefixMatcher,
    target: Arc<T>,
}

/// A matched route.
#[derive(Debug)]
pub struct RouteMatch<T> {
    pub target: Arc<T>,
    /// Path below the prefix, with a leading slash.
    pub key: String,
}

/// Prefix table mapping paths to targets.
#[derive(Debug)]
pub struct PrefixRouter<T> {
    routes: Vec<Route<T>>,
}

impl<T> Default for PrefixRouter<T> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<T> PrefixRouter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `target` under `prefix`. Returns false if the prefix is taken.
    pub fn insert(&mut self, prefix: &str, target: Arc<T>) -> bool {
        let matcher = PathPrefixMatcher::new(prefix);
        if self.routes.iter().any(|r| r.matcher.prefix() == matcher.prefix()) {
            return false;
        }
        self.routes.push(Route { matcher, target });
        self.routes
            .sort_by(|a, b| b.matcher.prefix().len().cmp(&a.matcher.prefix().len()));
        true
    }

    pub fn lookup(&self, path: &str) -> Option<RouteMatch<T>> {
        self.routes.iter().find_map(|route| {
            route.matcher.strip(path).map(|key| RouteMatch {
                target: route.target.clone(),
                key,
            })
        })
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|r| r.matcher.prefix())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_prefix_wins() {
        let mut router = PrefixRouter::new();
        assert!(router.insert("/api/v2/app/", Arc::new("outer")));
        assert!(router.insert("/api/v2/app/inner/", Arc::new("inner")));
        assert!(!router.insert("/api/v2/app", Arc::new("dup")));

        let hit = router.lookup("/api/v2/app/inner/key").unwrap();
        assert_eq!(*hit.target, "inner");
        assert_eq!(hit.key, "/key");

        let hit = router.lookup("/api/v2/app/other").unwrap();
        assert_eq!(*hit.target, "outer");
        assert_eq!(hit.key, "/other");
    }

    #[test]
    fn test_no_match() {
        let mut router = PrefixRouter::new();
        router.insert("/api/v1/consul01/", Arc::new(1));
        assert!(router.lookup("/api/v2/consul01/key").is_none());
        assert!(router.lookup("/health").is_none());
    }
}
