//! Live-audience broadcast provider
//!
//! Accepts publish requests for topics (live rooms), schedules them by
//! weight, and fans them out to a fleet of brokers over a small binary
//! protocol. Also answers "how many people are watching" from a cache fed
//! by the brokers and by peer providers.
//!
//! # Architecture
//!
//! ```text
//!   publish ──► Provider ──► AdmissionController (count)
//!                  │
//!                  ├──► OnlineCache ──► OnlineCollector ──► brokers / peers
//!                  │
//!                  ├──► PublishScheduler ── weight queues ── consumers
//!                  │                                          │
//!                  │              AdmissionController (qps) ◄─┤
//!                  │                                          ▼
//!                  │                     BrokerPool ──► PURE_PUB ──► brokers
//!                  │
//!                  └──► PeerClient ──► relay / bridge to other providers
//! ```
//!
//! Logging goes through `tracing`; the application installs the subscriber.

pub mod broker;
pub mod control;
pub mod error;
pub mod online;
pub mod peer;
pub mod protocol;
pub mod provider;
pub mod scheduler;
pub mod stats;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
pub use online::Scope;
pub use provider::{OnlineRanking, Provider, ProviderConfig, PublishOutcome};
pub use scheduler::{PublishJob, PublishRequest};
