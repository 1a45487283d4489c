//! Invalidation Listener Task
//!
//! Applies invalidation events published by the rest of the system.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::{CacheService, InvalidationEvent};

/// Spawns a task that removes the keys named by each received event.
///
/// The task ends when every sender has been dropped.
pub fn spawn_invalidation_listener(
    cache: CacheService,
    mut events: mpsc::Receiver<InvalidationEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match cache.invalidate(&event).await {
                Ok(removed) => info!(?event, removed, "invalidation event applied"),
                Err(e) => warn!(?event, error = %e, "invalidation event rejected"),
            }
        }
        info!("Invalidation listener stopped");
    })
}
