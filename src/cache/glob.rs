//! Glob Pattern Module
//!
//! Anchor-based matcher where `*` matches any run of characters, including
//! none. No other wildcard exists; matching is case-sensitive.

use crate::error::{CacheError, Result};

// == Glob Pattern ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    raw: String,
    /// Literal pieces between wildcards
    parts: Vec<String>,
}

impl GlobPattern {
    /// Parses a pattern. Empty patterns are rejected.
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(CacheError::InvalidArgument(
                "Pattern must not be empty".to_string(),
            ));
        }
        Ok(Self {
            raw: pattern.to_string(),
            parts: pattern.split('*').map(str::to_string).collect(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Literal text every match must start with.
    pub fn literal_prefix(&self) -> &str {
        &self.parts[0]
    }

    /// True if the pattern has no wildcard.
    pub fn is_literal(&self) -> bool {
        self.parts.len() == 1
    }

    // == Matches ==
    /// Tests a candidate against the full pattern.
    ///
    /// The first part is anchored at the start, the last at the end, and
    /// the middle parts are found left to right in what remains.
    pub fn matches(&self, candidate: &str) -> bool {
        if self.is_literal() {
            return candidate == self.raw;
        }

        let first = &self.parts[0];
        let last = &self.parts[self.parts.len() - 1];
        if candidate.len() < first.len() + last.len()
            || !candidate.starts_with(first.as_str())
            || !candidate.ends_with(last.as_str())
        {
            return false;
        }

        let mut rest = &candidate[first.len()..candidate.len() - last.len()];
        for part in &self.parts[1..self.parts.len() - 1] {
            match rest.find(part.as_str()) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
        true
    }
}

impl std::fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
