//! Weighted, priority-ordered publish scheduling
//!
//! Admitted jobs wait in one queue per weight level. Consumer workers drain
//! the levels highest first, drop jobs whose TTL ran out, and hand the rest
//! to a [`Dispatch`] backend. A busy backend sends the job back to its queue
//! in `pub_time` order.

pub mod consumer;
pub mod dispatch;
pub mod job;
pub mod queue;
pub mod signal;

pub use consumer::PublishScheduler;
pub use dispatch::{BrokerDispatcher, Dispatch, DispatchOutcome};
pub use job::{BrokerPayload, PublishJob, PublishRequest};
pub use queue::WeightedQueue;
pub use signal::ArrivalSignal;
