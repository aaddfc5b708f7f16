//! Single-flight gate: one download pipeline at a time, others are turned away

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Capacity-1 gate with non-blocking acquisition.
///
/// Callers that fail to acquire are rejected, never queued. The permit releases
/// the gate when dropped, so every exit path of the holder (including errors and
/// panics) frees it.
#[derive(Debug, Clone)]
pub struct SingleFlightGate {
    permits: Arc<Semaphore>,
}

/// Proof of holding the gate. Dropping it reopens the gate.
#[derive(Debug)]
pub struct FlightPermit {
    _permit: OwnedSemaphorePermit,
}

impl SingleFlightGate {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Take the gate if it is free. Returns `None` when a pipeline is running.
    pub fn try_acquire(&self) -> Option<FlightPermit> {
        self.permits
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| FlightPermit { _permit: permit })
    }

    pub fn is_busy(&self) -> bool {
        self.permits.available_permits() == 0
    }
}

impl Default for SingleFlightGate {
    fn default() -> Self {
        Self::new()
    }
}
