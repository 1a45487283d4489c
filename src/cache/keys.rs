//! Cache key layout and invalidation events.
//!
//! Keys follow `{kind}:{id}[:{scope}]` so related entries share a prefix
//! and can be dropped with one pattern.

use std::fmt;

use crate::cache::CacheCategory;

// == Cache Keys ==
/// Builders for the conventional key layout.
pub struct CacheKeys;

impl CacheKeys {
    pub fn principal(id: impl fmt::Display) -> String {
        format!("principal:{}", id)
    }

    pub fn role(id: impl fmt::Display) -> String {
        format!("role:{}", id)
    }

    pub fn role_permissions(role_id: impl fmt::Display, scope: &str) -> String {
        format!("permissions:role:{}:{}", role_id, scope)
    }

    pub fn principal_permissions(principal_id: impl fmt::Display, scope: &str) -> String {
        format!("permissions:principal:{}:{}", principal_id, scope)
    }

    pub fn directory(name: &str) -> String {
        format!("directory:{}", name.to_lowercase())
    }

    pub fn configuration(name: &str) -> String {
        format!("config:{}", name)
    }

    /// Category a key of this layout belongs to.
    pub fn category_of(key: &str) -> CacheCategory {
        match key.split(':').next() {
            Some("principal") => CacheCategory::Principal,
            Some("role") => CacheCategory::Role,
            Some("permissions") => CacheCategory::Permission,
            Some("directory") => CacheCategory::Directory,
            Some("config") => CacheCategory::Configuration,
            _ => CacheCategory::Default,
        }
    }
}

// == Invalidation Events ==
/// Domain changes that make cached entries stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationEvent {
    PrincipalChanged { principal_id: String },
    RoleChanged { role_id: String },
    RolePermissionsChanged { role_id: String },
    DirectoryChanged,
    /// None = every configuration entry
    ConfigurationChanged { name: Option<String> },
    /// Raw pattern from a caller that knows the layout
    Pattern(String),
}

impl InvalidationEvent {
    /// Patterns to remove for this event.
    pub fn patterns(&self) -> Vec<String> {
        match self {
            InvalidationEvent::PrincipalChanged { principal_id } => vec![
                CacheKeys::principal(principal_id),
                format!("permissions:principal:{}:*", principal_id),
            ],
            InvalidationEvent::RoleChanged { role_id } => vec![
                CacheKeys::role(role_id),
                format!("permissions:role:{}:*", role_id),
                // Effective principal permissions may include this role
                "permissions:principal:*".to_string(),
            ],
            InvalidationEvent::RolePermissionsChanged { role_id } => vec![
                format!("permissions:role:{}:*", role_id),
                "permissions:principal:*".to_string(),
            ],
            InvalidationEvent::DirectoryChanged => vec!["directory:*".to_string()],
            InvalidationEvent::ConfigurationChanged { name: Some(name) } => {
                vec![CacheKeys::configuration(name)]
            }
            InvalidationEvent::ConfigurationChanged { name: None } => vec!["config:*".to_string()],
            InvalidationEvent::Pattern(pattern) => vec![pattern.clone()],
        }
    }
}
