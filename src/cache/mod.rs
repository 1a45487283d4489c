//! Cache Module
//!
//! Category-aware cache facade over interchangeable local and distributed
//! providers, with per-category metrics, single-flight population and
//! glob-pattern invalidation.

pub mod codec;
mod category;
mod entry;
mod glob;
mod invalidation;
mod keys;
mod metrics;
mod policy;
pub mod provider;
mod service;
mod single_flight;


// Re-export public types
pub use category::CacheCategory;
pub use glob::GlobPattern;
pub use invalidation::{InvalidationEngine, InvalidationResult};
pub use keys::{CacheKeys, InvalidationEvent};
pub use metrics::{CacheMetrics, CategorySnapshot, CounterSnapshot, MetricsSnapshot};
pub use policy::{default_policy, CachePolicy, PolicyResolver, ProviderKind};
pub use provider::{
    CacheProvider, DistributedConfig, DistributedProvider, EvictionPolicy, LocalProvider, TtlState,
};
pub use service::{CacheService, TTL_MISSING, TTL_PERSISTENT};
pub use single_flight::{FlightError, SingleFlight};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 512;
