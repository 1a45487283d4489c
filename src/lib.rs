//! Identity Cache - category-aware caching for the identity service
//!
//! Provides one cache API over a local or distributed store, with
//! per-category TTL policies, metrics and pattern invalidation.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{CacheCategory, CacheService};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::{spawn_cleanup_task, spawn_invalidation_listener, spawn_metrics_reporter};
