//! Provider service and its configuration

pub mod config;
pub mod decorate;
pub mod service;

pub use config::ProviderConfig;
pub use decorate::{Decoration, Decorations, DEFAULT_DECORATION};
pub use service::{OnlineRanking, Provider, PublishOutcome};
