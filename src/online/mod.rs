//! Audience counting
//!
//! [`OnlineCollector`] asks brokers and peer providers; [`OnlineCache`]
//! keeps the answers per topic and refreshes them in the background.

pub mod cache;
pub mod collector;

pub use cache::{CacheEntry, OnlineCache, Scope};
pub use collector::{Collected, OnlineCollector};
