//! Broker connections and pooling
//!
//! Brokers are the downstream processes that hold end-client sockets. The
//! provider reaches each one over a persistent TCP connection speaking the
//! binary protocol in [`crate::protocol`].

pub mod config;
pub mod connection;
pub mod pool;

pub use config::PoolConfig;
pub use connection::BrokerConnection;
pub use pool::{BrokerPool, PooledConnection, SlotState};
