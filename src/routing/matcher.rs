//! Path matching logic.
//!
//! # Responsibilities
//! - Match path prefix (case-sensitive)
//! - Match exact path
//! - Compile allow-list patterns (`/health`, `/api/auth/*`) into matchers
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Prefix matching is plain `starts_with`; `/api/news` also captures `/api/newsletter`
//! - No regex to guarantee O(n) matching

/// Trait for matching request paths against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the path matches this condition.
    fn matches(&self, path: &str) -> bool;

    /// Length of the literal part; longer literals are more specific.
    fn specificity(&self) -> usize;
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    fn specificity(&self) -> usize {
        self.prefix.len()
    }
}

/// Matches one path exactly.
#[derive(Debug, Clone)]
pub struct ExactPathMatcher {
    path: String,
}

impl ExactPathMatcher {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Matcher for ExactPathMatcher {
    fn matches(&self, path: &str) -> bool {
        path == self.path
    }

    fn specificity(&self) -> usize {
        self.path.len()
    }
}

/// Compile an allow-list entry: a trailing `*` makes it a prefix, otherwise exact.
pub fn compile_pattern(pattern: &str) -> Box<dyn Matcher> {
    match pattern.strip_suffix('*') {
        Some(prefix) => Box::new(PathPrefixMatcher::new(prefix)),
        None => Box::new(ExactPathMatcher::new(pattern)),
    }
}
