//! In-flight request tracking.
//!
//! Every request holds an [`InFlightGuard`] while it is being served; the
//! shutdown coordinator reads the count to report how many requests a
//! forced stop abandons. Each change is mirrored to the
//! `echo_in_flight_requests` gauge.
//!
//! The guard is taken by the pipeline's in-flight stage
//! (`http::pipeline`), which is also where per-request count and latency
//! metrics are recorded.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Counts requests currently being served.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    active: Arc<AtomicUsize>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new request. The count drops when the guard does.
    pub fn track(&self) -> InFlightGuard {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_in_flight(active);
        InFlightGuard {
            active: Arc::clone(&self.active),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

}

/// Guard that tracks a request's lifetime.
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let active = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_in_flight(active);
    }
}
