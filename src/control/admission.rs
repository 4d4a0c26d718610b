//! Per-second admission control
//!
//! Two independent budgets protect the provider:
//!
//! - **count**: how many publish requests are accepted per second
//! - **qps**: how many client deliveries (audience size summed over every
//!   dispatched message) are attempted per second
//!
//! Crossing a ceiling latches an "exceeded" flag for the rest of the second,
//! so later attempts fail without touching the counter. The clock resets
//! both budgets on every tick. Ceilings can change at runtime and apply to
//! the next attempt; raising one above the current load clears its latch.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

/// Result of a qps admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpsAdmission {
    /// Within budget; `total` is this second's load including the request
    Admitted { total: i64 },
    /// Over budget; `total` is the load that tripped (or already tripped) it
    Exceeded { total: i64 },
}

impl QpsAdmission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, QpsAdmission::Admitted { .. })
    }
}

/// Per-second counters gating new work
#[derive(Debug)]
pub struct AdmissionController {
    max_count: AtomicI64,
    max_qps: AtomicI64,
    max_weight: AtomicUsize,

    cur_count: AtomicI64,
    count_exceeded: AtomicBool,

    cur_qps: AtomicI64,
    qps_exceeded: AtomicBool,
}

impl AdmissionController {
    /// Create a controller with the given ceilings
    pub fn new(max_count: i64, max_qps: i64, max_weight: usize) -> Self {
        Self {
            max_count: AtomicI64::new(max_count),
            max_qps: AtomicI64::new(max_qps),
            max_weight: AtomicUsize::new(max_weight),
            cur_count: AtomicI64::new(0),
            count_exceeded: AtomicBool::new(false),
            cur_qps: AtomicI64::new(0),
            qps_exceeded: AtomicBool::new(false),
        }
    }

    /// Count one message against this second's budget
    pub fn try_admit_message(&self) -> bool {
        if self.count_exceeded.load(Ordering::Acquire) {
            return false;
        }

        let current = self.cur_count.fetch_add(1, Ordering::AcqRel) + 1;
        if current > self.max_count.load(Ordering::Acquire) {
            self.count_exceeded.store(true, Ordering::Release);
            return false;
        }
        true
    }

    /// Add `audience` deliveries to this second's qps load
    pub fn try_admit_qps(&self, audience: i64) -> QpsAdmission {
        if self.qps_exceeded.load(Ordering::Acquire) {
            return QpsAdmission::Exceeded {
                total: self.cur_qps.load(Ordering::Acquire),
            };
        }

        let total = self.cur_qps.fetch_add(audience, Ordering::AcqRel) + audience;
        if total > self.max_qps.load(Ordering::Acquire) {
            self.qps_exceeded.store(true, Ordering::Release);
            return QpsAdmission::Exceeded { total };
        }
        QpsAdmission::Admitted { total }
    }

    /// Zero both counters and clear both latches
    pub fn reset(&self) {
        self.cur_count.store(0, Ordering::Release);
        self.count_exceeded.store(false, Ordering::Release);
        self.cur_qps.store(0, Ordering::Release);
        self.qps_exceeded.store(false, Ordering::Release);
    }

    pub fn max_count(&self) -> i64 {
        self.max_count.load(Ordering::Acquire)
    }

    /// Change the count ceiling; raising it above this second's count
    /// reopens a tripped budget
    pub fn set_max_count(&self, count: i64) {
        self.max_count.store(count, Ordering::Release);
        if count > self.cur_count.load(Ordering::Acquire) {
            self.count_exceeded.store(false, Ordering::Release);
        }
    }

    pub fn max_qps(&self) -> i64 {
        self.max_qps.load(Ordering::Acquire)
    }

    pub fn set_max_qps(&self, qps: i64) {
        self.max_qps.store(qps, Ordering::Release);
        if qps > self.cur_qps.load(Ordering::Acquire) {
            self.qps_exceeded.store(false, Ordering::Release);
        }
    }

    pub fn max_weight(&self) -> usize {
        self.max_weight.load(Ordering::Acquire)
    }

    pub fn set_max_weight(&self, weight: usize) {
        self.max_weight.store(weight, Ordering::Release);
    }

    /// Messages counted so far this second
    pub fn current_count(&self) -> i64 {
        self.cur_count.load(Ordering::Acquire)
    }

    /// Deliveries counted so far this second
    pub fn current_qps(&self) -> i64 {
        self.cur_qps.load(Ordering::Acquire)
    }
}
