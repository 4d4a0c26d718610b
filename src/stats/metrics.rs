//! Statistics for the publish pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Provider-wide counters, updated lock-free from every task
#[derive(Debug)]
pub struct ProviderStats {
    started_at: Instant,
    admitted: AtomicU64,
    rejected: AtomicU64,
    dispatched: AtomicU64,
    requeued: AtomicU64,
    expired: AtomicU64,
    dispatch_failures: AtomicU64,
    broker_publishes: AtomicU64,
    broker_publish_failures: AtomicU64,
}

impl ProviderStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            admitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            requeued: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
            broker_publishes: AtomicU64::new(0),
            broker_publish_failures: AtomicU64::new(0),
        }
    }

    /// Publish request passed the count budget
    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish request dropped by the count budget
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Job fanned out to the brokers
    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Job pushed back after a busy dispatch
    pub fn record_requeued(&self) {
        self.requeued.fetch_add(1, Ordering::Relaxed);
    }

    /// Job dropped because its TTL ran out in the queue
    pub fn record_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    /// Job could not be prepared for dispatch
    pub fn record_dispatch_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Outcome of one per-broker PURE_PUB write
    pub fn record_broker_publish(&self, ok: bool) {
        if ok {
            self.broker_publishes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.broker_publish_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Copy the counters out
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime: self.started_at.elapsed(),
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            broker_publishes: self.broker_publishes.load(Ordering::Relaxed),
            broker_publish_failures: self.broker_publish_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for ProviderStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`ProviderStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Time since the stats were created
    pub uptime: Duration,
    /// Publish requests accepted
    pub admitted: u64,
    /// Publish requests dropped by the count budget
    pub rejected: u64,
    /// Jobs fanned out to brokers
    pub dispatched: u64,
    /// Busy requeues
    pub requeued: u64,
    /// Jobs dropped on TTL
    pub expired: u64,
    /// Jobs that failed before fan-out
    pub dispatch_failures: u64,
    /// Successful per-broker writes
    pub broker_publishes: u64,
    /// Failed per-broker attempts (no connection or write error)
    pub broker_publish_failures: u64,
}

impl StatsSnapshot {
    /// Broker writes per second since start
    pub fn broker_publish_rate(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.broker_publishes as f64 / secs
        } else {
            0.0
        }
    }
}
