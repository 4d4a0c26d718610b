//! Per-weight job queue
//!
//! Two insertion policies:
//!
//! - `push_back`: freshly admitted jobs go to the tail
//! - `insert_by_pub_time`: requeued jobs go before the first job whose
//!   `pub_time` is strictly later, so older requeued work drains first
//!
//! Each queue has its own lock; different weight levels never contend.

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::job::PublishJob;

/// Ordered queue for one weight level
#[derive(Debug, Default)]
pub struct WeightedQueue {
    jobs: Mutex<VecDeque<PublishJob>>,
}

impl WeightedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a freshly admitted job
    pub fn push_back(&self, job: PublishJob) {
        self.jobs.lock().push_back(job);
    }

    /// Insert a requeued job in `pub_time` order
    pub fn insert_by_pub_time(&self, job: PublishJob) {
        let mut jobs = self.jobs.lock();
        match jobs.iter().position(|queued| queued.pub_time > job.pub_time) {
            Some(index) => jobs.insert(index, job),
            None => jobs.push_back(job),
        }
    }

    /// Take the head job
    pub fn pop_front(&self) -> Option<PublishJob> {
        self.jobs.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}
