//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled prefix rules
//! - Look up the backend service for a request path
//! - Return the matched service or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Rules sorted by prefix length at construction, so `/api/news/parse`
//!   is evaluated before `/api/news` regardless of configuration order
//! - O(n) path prefix scan (acceptable for typical route counts)
//! - Explicit no-match rather than silent default

use crate::config::RouteConfig;
use crate::routing::matcher::{Matcher, PathPrefixMatcher};

#[derive(Debug, Clone)]
struct Rule {
    matcher: PathPrefixMatcher,
    service: String,
}

/// Maps request paths to backend service names.
#[derive(Debug, Clone)]
pub struct ServiceRouter {
    rules: Vec<Rule>,
}

impl ServiceRouter {
    pub fn from_config(routes: &[RouteConfig]) -> Self {
        let mut rules: Vec<Rule> = routes
            .iter()
            .map(|r| Rule {
                matcher: PathPrefixMatcher::new(r.path_prefix.clone()),
                service: r.service.clone(),
            })
            .collect();
        // Stable: equal-length prefixes keep their configured order.
        rules.sort_by(|a, b| b.matcher.specificity().cmp(&a.matcher.specificity()));

        tracing::debug!(rules = rules.len(), "Route table compiled");
        Self { rules }
    }

    /// The service owning `path`, if any rule matches.
    pub fn route(&self, path: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| r.matcher.matches(path))
            .map(|r| r.service.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
