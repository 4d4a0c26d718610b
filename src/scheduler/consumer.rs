//! Weighted publish scheduler
//!
//! One queue per weight level plus a pool of consumer workers. Each worker
//! waits for one arrival token and then makes a single pass from the highest
//! weight down to zero, taking at most one job per level. Higher weights are
//! served first on every pass without starving the lower ones.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::dispatch::{Dispatch, DispatchOutcome};
use super::job::PublishJob;
use super::queue::WeightedQueue;
use super::signal::ArrivalSignal;
use crate::control::{AdmissionController, Clock};
use crate::stats::ProviderStats;

/// Queues, arrival signal and consumer loop
pub struct PublishScheduler<D> {
    queues: Vec<WeightedQueue>,
    signal: ArrivalSignal,
    admission: Arc<AdmissionController>,
    clock: Arc<Clock>,
    dispatcher: D,
    stats: Arc<ProviderStats>,
}

impl<D: Dispatch> PublishScheduler<D> {
    /// Create queues for weights `0..=max_weight`
    ///
    /// The arrival signal is sized from the admission count ceiling.
    pub fn new(
        max_weight: usize,
        admission: Arc<AdmissionController>,
        clock: Arc<Clock>,
        dispatcher: D,
        stats: Arc<ProviderStats>,
    ) -> Self {
        let queues = (0..=max_weight).map(|_| WeightedQueue::new()).collect();
        let capacity = admission.max_count().max(1) as usize;

        Self {
            queues,
            signal: ArrivalSignal::new(capacity),
            admission,
            clock,
            dispatcher,
            stats,
        }
    }

    /// Push a job into the queue for its weight and wake a consumer
    ///
    /// Returns `false` if no queue exists for the weight.
    pub fn collect_publish(&self, job: PublishJob, requeue: bool) -> bool {
        let queue = match usize::try_from(job.weight)
            .ok()
            .and_then(|weight| self.queues.get(weight))
        {
            Some(queue) => queue,
            None => {
                tracing::warn!(
                    upstream_id = %job.upstream_id,
                    weight = job.weight,
                    "No queue for weight, job discarded"
                );
                return false;
            }
        };

        if requeue {
            queue.insert_by_pub_time(job);
        } else {
            queue.push_back(job);
        }
        self.signal.notify();
        true
    }

    /// One top-to-bottom pass over the weight levels
    ///
    /// Returns the number of jobs popped.
    pub async fn consume_pass(&self) -> usize {
        let top = self
            .admission
            .max_weight()
            .min(self.queues.len().saturating_sub(1));
        let mut popped = 0;

        for weight in (0..=top).rev() {
            let Some(job) = self.queues[weight].pop_front() else {
                continue;
            };
            popped += 1;

            let now = self.clock.now();
            if job.is_expired(now) {
                tracing::debug!(
                    upstream_id = %job.upstream_id,
                    topic = %job.topic,
                    pub_time = job.pub_time,
                    ttl = job.ttl,
                    now,
                    "Job expired before dispatch"
                );
                self.stats.record_expired();
                continue;
            }

            match self.dispatcher.dispatch(&job).await {
                DispatchOutcome::Sent => self.stats.record_dispatched(),
                DispatchOutcome::Busy => {
                    tracing::warn!(
                        upstream_id = %job.upstream_id,
                        topic = %job.topic,
                        "Dispatch busy, requeueing"
                    );
                    self.stats.record_requeued();
                    self.collect_publish(job, true);
                }
                DispatchOutcome::Failed => self.stats.record_dispatch_failure(),
            }
        }

        popped
    }

    /// Spawn `count` consumer workers
    pub fn spawn_consumers(self: &Arc<Self>, count: usize) -> Vec<JoinHandle<()>> {
        (0..count)
            .map(|worker| {
                let scheduler = Arc::clone(self);
                tokio::spawn(async move {
                    tracing::debug!(worker, "Publish consumer started");
                    loop {
                        scheduler.signal.wait().await;
                        scheduler.consume_pass().await;
                    }
                })
            })
            .collect()
    }

    /// Resize the arrival signal after a count ceiling change
    pub fn resize_signal(&self, capacity: usize) {
        self.signal.resize(capacity);
    }

    /// Highest weight a queue exists for
    pub fn max_weight(&self) -> usize {
        self.queues.len().saturating_sub(1)
    }

    /// Jobs waiting at `weight`
    pub fn queue_len(&self, weight: usize) -> usize {
        self.queues.get(weight).map_or(0, WeightedQueue::len)
    }

    /// Jobs waiting across all levels
    pub fn pending(&self) -> usize {
        self.queues.iter().map(WeightedQueue::len).sum()
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }
}
