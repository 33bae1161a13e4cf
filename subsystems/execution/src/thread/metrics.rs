//! # Lifecycle Metrics
//!
//! Counters for thread lifecycle events.

use super::LifecycleState;
use core::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle metrics
#[derive(Debug, Default)]
pub struct LifecycleMetrics {
    /// Threads spawned
    spawned: AtomicU64,
    /// Spawns refused by the substrate
    spawn_failures: AtomicU64,
    /// Successful joins
    joins: AtomicU64,
    /// Successful detaches
    detaches: AtomicU64,
    /// Accepted cancellation requests
    cancel_requests: AtomicU64,
    /// Entry routines that returned
    returned: AtomicU64,
    /// Threads that called `exit_current`
    exited: AtomicU64,
    /// Threads that acted on a cancellation request
    canceled: AtomicU64,
    /// Threads whose entry routine panicked
    panicked: AtomicU64,
    /// Threads reclaimed
    reclaimed: AtomicU64,
}

impl LifecycleMetrics {
    /// Create new metrics
    pub const fn new() -> Self {
        Self {
            spawned: AtomicU64::new(0),
            spawn_failures: AtomicU64::new(0),
            joins: AtomicU64::new(0),
            detaches: AtomicU64::new(0),
            cancel_requests: AtomicU64::new(0),
            returned: AtomicU64::new(0),
            exited: AtomicU64::new(0),
            canceled: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_spawn(&self) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_spawn_failure(&self) {
        self.spawn_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_join(&self) {
        self.joins.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_detach(&self) {
        self.detaches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancel_request(&self) {
        self.cancel_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reclaim(&self) {
        self.reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how a thread terminated
    pub(crate) fn record_termination(&self, state: LifecycleState) {
        let counter = match state {
            LifecycleState::ReturnedNormally => &self.returned,
            LifecycleState::ExitedExplicitly => &self.exited,
            LifecycleState::Canceled => &self.canceled,
            LifecycleState::Panicked => &self.panicked,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get threads spawned
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Get spawn failures
    pub fn spawn_failures(&self) -> u64 {
        self.spawn_failures.load(Ordering::Relaxed)
    }

    /// Get successful joins
    pub fn joins(&self) -> u64 {
        self.joins.load(Ordering::Relaxed)
    }

    /// Get successful detaches
    pub fn detaches(&self) -> u64 {
        self.detaches.load(Ordering::Relaxed)
    }

    /// Get accepted cancellation requests
    pub fn cancel_requests(&self) -> u64 {
        self.cancel_requests.load(Ordering::Relaxed)
    }

    /// Get normal returns
    pub fn returned(&self) -> u64 {
        self.returned.load(Ordering::Relaxed)
    }

    /// Get explicit exits
    pub fn exited(&self) -> u64 {
        self.exited.load(Ordering::Relaxed)
    }

    /// Get cancellations acted upon
    pub fn canceled(&self) -> u64 {
        self.canceled.load(Ordering::Relaxed)
    }

    /// Get panicked threads
    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    /// Get reclaimed threads
    pub fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::Relaxed)
    }

    /// Get terminated threads of every kind
    pub fn terminated(&self) -> u64 {
        self.returned() + self.exited() + self.canceled() + self.panicked()
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.spawned.store(0, Ordering::Relaxed);
        self.spawn_failures.store(0, Ordering::Relaxed);
        self.joins.store(0, Ordering::Relaxed);
        self.detaches.store(0, Ordering::Relaxed);
        self.cancel_requests.store(0, Ordering::Relaxed);
        self.returned.store(0, Ordering::Relaxed);
        self.exited.store(0, Ordering::Relaxed);
        self.canceled.store(0, Ordering::Relaxed);
        self.panicked.store(0, Ordering::Relaxed);
        self.reclaimed.store(0, Ordering::Relaxed);
    }
}

/// Global lifecycle metrics
static METRICS: LifecycleMetrics = LifecycleMetrics::new();

/// Get the lifecycle metrics
pub fn lifecycle_metrics() -> &'static LifecycleMetrics {
    &METRICS
}
