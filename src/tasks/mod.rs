//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of the service.
//!
//! # Tasks
//! - Expiry Cleanup: Purges expired local entries at configured intervals
//! - Invalidation Listener: Applies domain invalidation events
//! - Metrics Reporter: Logs the metrics summary periodically

mod cleanup;
mod invalidation;
mod report;

pub use cleanup::spawn_cleanup_task;
pub use invalidation::spawn_invalidation_listener;
pub use report::spawn_metrics_reporter;
