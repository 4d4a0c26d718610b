//! Calls to peer providers
//!
//! Peers are other provider instances. They are asked for their local
//! audience when computing a total count, and receive relayed or bridged
//! publish jobs.

pub mod client;
pub mod envelope;

pub use client::{PeerClient, RequestSigner, Unsigned};
pub use envelope::{Envelope, OnlineData, OnlineQuery, SUCCESS_CODE};
