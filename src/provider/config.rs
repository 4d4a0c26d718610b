//! Provider configuration

use std::collections::HashMap;
use std::time::Duration;

use crate::broker::PoolConfig;
use crate::error::ConfigError;

/// Provider configuration options
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Highest publish weight; also the longest TTL in seconds
    pub max_weight: usize,

    /// Publish requests admitted per second
    pub max_publish_count: i64,

    /// Client deliveries (audience summed over dispatches) per second
    pub max_publish_qps: i64,

    /// Number of scheduler consumer workers
    pub consumer_concurrency: usize,

    /// Broker connection pool options
    pub pool: PoolConfig,

    /// How long a local online count stays fresh
    pub local_online_expire: Duration,

    /// How long a total online count stays fresh
    pub total_online_expire: Duration,

    /// How often stale online entries are dropped
    pub online_purge_interval: Duration,

    /// Connect and response deadline for peer HTTP calls
    pub http_rpc_timeout: Duration,

    /// Brokers of this cluster (`host:port`)
    pub broker_addrs: Vec<String>,

    /// Providers of this cluster to relay to and collect from
    pub relay_addrs: Vec<String>,

    /// Providers of other clusters to bridge to
    pub bridge_addrs: Vec<String>,

    /// Path of the peer collect-online endpoint
    pub collect_online_path: String,

    /// Path of the peer relay endpoint
    pub relay_publish_path: String,

    /// Path of the peer bridge endpoint
    pub bridge_publish_path: String,

    /// Invoker name used when relaying
    pub relay_invoker: String,

    /// Invoker name used when bridging
    pub bridge_invoker: String,

    /// Initial online decorations by topic (`"default"` applies to the rest)
    pub decorations: HashMap<String, f64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            max_weight: 10,
            max_publish_count: 1000,
            max_publish_qps: 1_000_000,
            consumer_concurrency: 4,
            pool: PoolConfig::default(),
            local_online_expire: Duration::from_secs(3),
            total_online_expire: Duration::from_secs(5),
            online_purge_interval: Duration::from_secs(3 * 60 * 60),
            http_rpc_timeout: Duration::from_secs(3),
            broker_addrs: Vec::new(),
            relay_addrs: Vec::new(),
            bridge_addrs: Vec::new(),
            collect_online_path: "/provider/v1/online/collect".into(),
            relay_publish_path: "/provider/v1/publish/relay".into(),
            bridge_publish_path: "/provider/v1/publish/bridge".into(),
            relay_invoker: "relay".into(),
            bridge_invoker: "bridge".into(),
            decorations: HashMap::new(),
        }
    }
}

impl ProviderConfig {
    /// Create a config for the given brokers
    pub fn with_brokers(brokers: Vec<String>) -> Self {
        Self {
            broker_addrs: brokers,
            ..Default::default()
        }
    }

    /// Set the highest weight
    pub fn max_weight(mut self, weight: usize) -> Self {
        self.max_weight = weight;
        self
    }

    /// Set the per-second publish count ceiling
    pub fn max_publish_count(mut self, count: i64) -> Self {
        self.max_publish_count = count;
        self
    }

    /// Set the per-second delivery ceiling
    pub fn max_publish_qps(mut self, qps: i64) -> Self {
        self.max_publish_qps = qps;
        self
    }

    /// Set the number of consumer workers
    pub fn consumer_concurrency(mut self, workers: usize) -> Self {
        self.consumer_concurrency = workers;
        self
    }

    /// Set broker pool options
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set the local and total online freshness windows
    pub fn online_expire(mut self, local: Duration, total: Duration) -> Self {
        self.local_online_expire = local;
        self.total_online_expire = total;
        self
    }

    /// Set the peer HTTP deadline
    pub fn http_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.http_rpc_timeout = timeout;
        self
    }

    /// Set the same-cluster peers
    pub fn relay_addrs(mut self, addrs: Vec<String>) -> Self {
        self.relay_addrs = addrs;
        self
    }

    /// Set the cross-cluster peers
    pub fn bridge_addrs(mut self, addrs: Vec<String>) -> Self {
        self.bridge_addrs = addrs;
        self
    }

    /// Add an online decoration
    pub fn decoration(mut self, topic: impl Into<String>, factor: f64) -> Self {
        self.decorations.insert(topic.into(), factor);
        self
    }

    /// Check the knobs that must be positive and the address lists
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_weight == 0 {
            return Err(ConfigError::NotPositive("max_weight"));
        }
        if self.max_publish_count <= 0 {
            return Err(ConfigError::NotPositive("max_publish_count"));
        }
        if self.max_publish_qps <= 0 {
            return Err(ConfigError::NotPositive("max_publish_qps"));
        }
        if self.consumer_concurrency == 0 {
            return Err(ConfigError::NotPositive("consumer_concurrency"));
        }
        if self.pool.max_conn_per_address == 0 {
            return Err(ConfigError::NotPositive("max_conn_per_address"));
        }
        for (name, period) in [
            ("local_online_expire", self.local_online_expire),
            ("total_online_expire", self.total_online_expire),
            ("online_purge_interval", self.online_purge_interval),
            ("http_rpc_timeout", self.http_rpc_timeout),
        ] {
            if period.is_zero() {
                return Err(ConfigError::NotPositive(name));
            }
        }
        for (name, addrs) in [
            ("broker_addrs", &self.broker_addrs),
            ("relay_addrs", &self.relay_addrs),
            ("bridge_addrs", &self.bridge_addrs),
        ] {
            if addrs.iter().any(|addr| addr.trim().is_empty()) {
                return Err(ConfigError::EmptyAddress(name));
            }
        }
        Ok(())
    }
}
