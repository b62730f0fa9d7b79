//! Target name filtering.

use regex::{Regex, RegexBuilder};

use crate::domain::errors::TreeError;
use crate::domain::model::ENSURE_NUGET_PACKAGE_BUILD_IMPORTS;

/// Visibility predicate for targets, compiled once per tree build.
#[derive(Debug, Clone)]
pub struct TargetFilter {
    pattern: String,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    All,
    Pattern(Regex),
    /// The pattern did not compile; nothing matches.
    Invalid(String),
}

impl TargetFilter {
    /// Compile `pattern` as a case-insensitive regular expression. An empty
    /// pattern shows every target; an invalid one shows none.
    pub fn new(pattern: &str) -> Self {
        let matcher = if pattern.is_empty() {
            Matcher::All
        } else {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(regex) => Matcher::Pattern(regex),
                Err(err) => {
                    tracing::warn!(pattern, error = %err, "invalid target filter");
                    Matcher::Invalid(err.to_string())
                }
            }
        };
        Self {
            pattern: pattern.to_owned(),
            matcher,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_visible(&self, target: &str) -> bool {
        if target == ENSURE_NUGET_PACKAGE_BUILD_IMPORTS {
            return false;
        }
        match &self.matcher {
            Matcher::All => true,
            Matcher::Pattern(regex) => regex.is_match(target),
            Matcher::Invalid(_) => false,
        }
    }

    /// The compile error, if the pattern was rejected.
    pub fn error(&self) -> Option<TreeError> {
        match &self.matcher {
            Matcher::Invalid(message) => Some(TreeError::InvalidFilter {
                pattern: self.pattern.clone(),
                message: message.clone(),
            }),
            _ => None,
        }
    }
}

impl Default for TargetFilter {
    fn default() -> Self {
        Self::new("")
    }
}
