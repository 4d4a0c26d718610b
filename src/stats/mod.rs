//! Pipeline statistics

pub mod metrics;

pub use metrics::{ProviderStats, StatsSnapshot};
