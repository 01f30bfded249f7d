//! Route rule configuration and matching.
//!
//! This module maps request paths to their rate limit quotas. Patterns are
//! `/`-segmented globs: a literal segment matches itself, `*` matches exactly
//! one segment, and a trailing `**` matches any non-empty remainder of the
//! path. Rules are evaluated in declaration order and the first match wins.

use serde::{Deserialize, Serialize};

/// A configured rate limit rule for a route pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    /// The route glob this rule applies to
    pub pattern: String,
    /// Maximum requests allowed per window
    pub max_requests: u32,
    /// Window length in seconds
    pub interval_seconds: u64,
}

/// The quota resolved for one request.
///
/// `route` carries the matched pattern and is used for key construction
/// only; it has no semantic weight in the evaluation itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteQuota {
    /// Maximum requests allowed per window
    pub max_requests: u32,
    /// Window length in seconds
    pub interval_seconds: u64,
    /// The pattern that matched, used to namespace the store key
    pub route: String,
}

/// An ordered set of route rules.
#[derive(Debug, Clone, Default)]
pub struct RouteRules {
    rules: Vec<RouteRule>,
}

impl RouteRules {
    /// Create a rule set, preserving declaration order.
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    /// Resolve the quota for a request path.
    ///
    /// Returns `None` when no rule applies, which the gate treats as a
    /// signal to skip evaluation entirely.
    pub fn resolve(&self, path: &str) -> Option<RouteQuota> {
        self.rules
            .iter()
            .find(|rule| pattern_matches(&rule.pattern, path))
            .map(|rule| RouteQuota {
                max_requests: rule.max_requests,
                interval_seconds: rule.interval_seconds,
                route: rule.pattern.clone(),
            })
    }

    /// Number of configured rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the rule set is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Match a route glob against a concrete request path.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    for (index, pattern_segment) in pattern_segments.iter().enumerate() {
        if *pattern_segment == "**" {
            // Trailing deep wildcard: any non-empty remainder matches.
            return path_segments.len() > index;
        }
        match path_segments.get(index) {
            Some(path_segment) => {
                if *pattern_segment != "*" && pattern_segment != path_segment {
                    return false;
                }
            }
            None => return false,
        }
    }

    path_segments.len() == pattern_segments.len()
}
