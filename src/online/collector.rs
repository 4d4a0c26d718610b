//! Audience collection from brokers and peers
//!
//! Every source is queried in its own task and all of them are joined
//! before summing. A failing source contributes zero and is logged; the
//! partial sum is still returned.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::broker::BrokerPool;
use crate::error::Result;
use crate::peer::PeerClient;

/// Sum of the sources that answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Collected {
    pub online: i64,
    /// At least one source failed
    pub had_error: bool,
}

/// Queries brokers and peer providers for a topic's audience
pub struct OnlineCollector {
    pool: Arc<BrokerPool>,
    brokers: Arc<[String]>,
    peers: PeerClient,
    peer_addrs: Arc<[String]>,
    collect_path: Arc<str>,
}

impl OnlineCollector {
    pub fn new(
        pool: Arc<BrokerPool>,
        brokers: Vec<String>,
        peers: PeerClient,
        peer_addrs: Vec<String>,
        collect_path: String,
    ) -> Self {
        Self {
            pool,
            brokers: brokers.into(),
            peers,
            peer_addrs: peer_addrs.into(),
            collect_path: collect_path.into(),
        }
    }

    /// Audience connected to this cluster's brokers
    pub async fn collect_local(&self, topic: &str) -> Collected {
        let mut tasks = JoinSet::new();

        for addr in self.brokers.iter() {
            let pool = Arc::clone(&self.pool);
            let addr = addr.clone();
            let topic = topic.to_string();

            tasks.spawn(async move {
                let result = query_broker(&pool, &addr, &topic).await;
                (addr, topic, result)
            });
        }

        let mut collected = Collected::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((addr, topic, Ok(online))) => {
                    tracing::debug!(broker = %addr, topic = %topic, online, "Broker online count");
                    collected.online += i64::from(online);
                }
                Ok((addr, topic, Err(e))) => {
                    tracing::error!(broker = %addr, topic = %topic, error = %e, "Broker online query failed");
                    collected.had_error = true;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Broker online task failed");
                    collected.had_error = true;
                }
            }
        }

        collected
    }

    /// Sum of every peer provider's local audience
    pub async fn collect_peers(&self, topic: &str) -> Collected {
        let mut tasks = JoinSet::new();

        for addr in self.peer_addrs.iter() {
            let peers = self.peers.clone();
            let path = Arc::clone(&self.collect_path);
            let addr = addr.clone();
            let topic = topic.to_string();

            tasks.spawn(async move {
                let result = peers.collect_online(&addr, &path, &topic).await;
                (addr, topic, result)
            });
        }

        let mut collected = Collected::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((addr, topic, Ok(online))) => {
                    tracing::debug!(peer = %addr, topic = %topic, online, "Peer online count");
                    collected.online += online;
                }
                Ok((addr, topic, Err(e))) => {
                    tracing::error!(peer = %addr, topic = %topic, error = %e, "Peer online collect failed");
                    collected.had_error = true;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Peer online task failed");
                    collected.had_error = true;
                }
            }
        }

        collected
    }
}

async fn query_broker(pool: &BrokerPool, addr: &str, topic: &str) -> Result<u32> {
    let mut conn = pool.acquire(addr).await?;
    let result = conn.query_topic_online(topic).await;
    conn.release();
    result
}
