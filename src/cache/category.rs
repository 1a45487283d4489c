//! Cache Category Module
//!
//! Semantic groupings of cache keys used to pick policies and scope metrics.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::CacheError;

// == Cache Category ==
/// The semantic category a cache entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCategory {
    /// Directory (LDAP/AD) lookups
    Directory,
    /// Application configuration values
    Configuration,
    /// Users and service principals
    Principal,
    /// Role definitions
    Role,
    /// Resolved permission sets
    Permission,
    /// Anything untagged
    #[default]
    Default,
}

impl CacheCategory {
    /// Number of categories.
    pub const COUNT: usize = 6;

    /// All categories in index order.
    pub const ALL: [CacheCategory; Self::COUNT] = [
        CacheCategory::Directory,
        CacheCategory::Configuration,
        CacheCategory::Principal,
        CacheCategory::Role,
        CacheCategory::Permission,
        CacheCategory::Default,
    ];

    /// Stable index, also the id written into stored envelopes.
    pub fn index(self) -> usize {
        match self {
            CacheCategory::Directory => 0,
            CacheCategory::Configuration => 1,
            CacheCategory::Principal => 2,
            CacheCategory::Role => 3,
            CacheCategory::Permission => 4,
            CacheCategory::Default => 5,
        }
    }

    /// Inverse of [`CacheCategory::index`]. Unknown ids fall back to `Default`.
    pub fn from_index(index: usize) -> Self {
        Self::ALL.get(index).copied().unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CacheCategory::Directory => "directory",
            CacheCategory::Configuration => "configuration",
            CacheCategory::Principal => "principal",
            CacheCategory::Role => "role",
            CacheCategory::Permission => "permission",
            CacheCategory::Default => "default",
        }
    }

    /// Upper-case name used in environment variable keys.
    pub fn env_name(self) -> &'static str {
        match self {
            CacheCategory::Directory => "DIRECTORY",
            CacheCategory::Configuration => "CONFIGURATION",
            CacheCategory::Principal => "PRINCIPAL",
            CacheCategory::Role => "ROLE",
            CacheCategory::Permission => "PERMISSION",
            CacheCategory::Default => "DEFAULT",
        }
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheCategory {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CacheError::InvalidArgument(format!("Unknown cache category: {}", s)))
    }
}
