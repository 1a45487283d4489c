//! Single-Flight Module
//!
//! Deduplicates concurrent computations per key. The first caller spawns
//! the work; later callers await the same shared result. The work runs on
//! its own task, so callers that give up do not cancel it for the others.

use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use crate::error::CacheError;

// == Flight Error ==
/// Cloneable failure shared by every waiter of a flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlightError {
    /// The factory returned an error
    Factory(String),
    /// The value could not be serialized
    Serialization(String),
    /// The task panicked or was cancelled by runtime shutdown
    Aborted(String),
}

impl From<FlightError> for CacheError {
    fn from(err: FlightError) -> Self {
        match err {
            FlightError::Factory(msg) => CacheError::Factory(msg),
            FlightError::Serialization(msg) => CacheError::Decode(msg),
            FlightError::Aborted(msg) => CacheError::Factory(format!("computation aborted: {}", msg)),
        }
    }
}

/// Serialized payload produced by a flight.
pub type FlightResult = Result<Arc<Vec<u8>>, FlightError>;

type SharedFlight = Shared<BoxFuture<'static, FlightResult>>;

// == Flight Guard ==
/// Unregisters a flight when its task ends, however it ends.
struct FlightGuard {
    inflight: Arc<DashMap<String, SharedFlight>>,
    key: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.inflight.remove(&self.key);
    }
}

// == Single Flight ==
#[derive(Clone, Default)]
pub struct SingleFlight {
    inflight: Arc<DashMap<String, SharedFlight>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` for `key` unless a flight for it is already running, in
    /// which case its result is awaited instead and `work` is dropped unpolled.
    pub async fn run<F>(&self, key: &str, work: F) -> FlightResult
    where
        F: Future<Output = FlightResult> + Send + 'static,
    {
        let flight = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(existing) => {
                debug!(key = %key, "joining in-flight computation");
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                let guard = FlightGuard {
                    inflight: Arc::clone(&self.inflight),
                    key: key.to_string(),
                };
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    work.await
                });
                let shared = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(e) => Err(FlightError::Aborted(e.to_string())),
                    }
                }
                .boxed()
                .shared();
                slot.insert(shared.clone());
                shared
            }
        };
        flight.await
    }

    /// Number of computations currently running.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}
