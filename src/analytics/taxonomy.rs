//! Classification of conversion failure messages.
//!
//! The policy is the ordered [`RULES`] table. A message gets the category of
//! the first rule with a matching pattern; anything unmatched is
//! [`ErrorCategory::Other`]. Matching is case-insensitive.

use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Timeout,
    RateLimited,
    NetworkError,
    PageLoadFailed,
    Other,
}

impl ErrorCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timeout => "Timeout",
            Self::RateLimited => "Rate Limited",
            Self::NetworkError => "Network Error",
            Self::PageLoadFailed => "Page Load Failed",
            Self::Other => "Other",
        }
    }
}

/// One row of the classification table.
///
/// Each pattern is a list of fragments that must appear in order; the rule
/// matches when any of its patterns does.
pub struct Rule {
    pub category: ErrorCategory,
    pub patterns: &'static [&'static [&'static str]],
}

pub const RULES: &[Rule] = &[
    Rule {
        category: ErrorCategory::Timeout,
        patterns: &[&["timeout"]],
    },
    Rule {
        category: ErrorCategory::RateLimited,
        patterns: &[&["rate", "limit"]],
    },
    Rule {
        category: ErrorCategory::NetworkError,
        patterns: &[&["net::err"], &["connection"]],
    },
    Rule {
        category: ErrorCategory::PageLoadFailed,
        patterns: &[&["navigation"], &["goto"]],
    },
];

fn matches_in_order(haystack: &str, fragments: &[&str]) -> bool {
    let mut rest = haystack;
    for fragment in fragments {
        match rest.find(fragment) {
            Some(pos) => rest = &rest[pos + fragment.len()..],
            None => return false,
        }
    }
    true
}

/// Category of a single failure message.
pub fn classify(message: &str) -> ErrorCategory {
    let lowered = message.to_lowercase();
    RULES
        .iter()
        .find(|rule| {
            rule.patterns
                .iter()
                .any(|pattern| matches_in_order(&lowered, pattern))
        })
        .map(|rule| rule.category)
        .unwrap_or(ErrorCategory::Other)
}

/// Failed-job count for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBreakdown {
    pub category: &'static str,
    pub count: u64,
}

/// Fold per-message counts into categories, largest first.
pub fn breakdown<'a, I>(messages: I) -> Vec<ErrorBreakdown>
where
    I: IntoIterator<Item = (&'a str, u64)>,
{
    let mut totals: HashMap<ErrorCategory, u64> = HashMap::new();
    for (message, count) in messages {
        *totals.entry(classify(message)).or_default() += count;
    }

    let mut result: Vec<ErrorBreakdown> = totals
        .into_iter()
        .map(|(category, count)| ErrorBreakdown {
            category: category.label(),
            count,
        })
        .collect();
    result.sort_by(|a, b| b.count.cmp(&a.count).then(a.category.cmp(b.category)));
    result
}
