//! Shared one-second clock
//!
//! A single task ticks once per second. It is the only writer of the current
//! unix second and the only resetter of the admission counters.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::MissedTickBehavior;

use super::admission::AdmissionController;

/// Coarse wall clock with one-second resolution
#[derive(Debug)]
pub struct Clock {
    unix: AtomicI64,
}

impl Clock {
    /// Create a clock set to the current time
    pub fn new() -> Self {
        Self {
            unix: AtomicI64::new(unix_now()),
        }
    }

    /// Current unix second as of the last tick
    pub fn now(&self) -> i64 {
        self.unix.load(Ordering::Acquire)
    }

    /// Overwrite the current second
    ///
    /// Only the tick task calls this in production; tests use it to move
    /// time without waiting.
    pub fn set(&self, unix: i64) {
        self.unix.store(unix, Ordering::Release);
    }

    /// Advance to wall time and reset the per-second admission counters
    pub fn tick(&self, admission: &AdmissionController) {
        self.set(unix_now());
        admission.reset();
    }

    /// Spawn the ticking task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn(
        self: &Arc<Self>,
        admission: Arc<AdmissionController>,
    ) -> tokio::task::JoinHandle<()> {
        let clock = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                clock.tick(&admission);
            }
        })
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
