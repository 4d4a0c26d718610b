//! Broker pool configuration

use std::time::Duration;

/// Broker connection pool options
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum connections (idle + in use) per broker address
    pub max_conn_per_address: usize,

    /// Dial timeout, also used as the read/write deadline (`None` = no deadline)
    pub io_timeout: Option<Duration>,

    /// How long `acquire` keeps retrying when an address is at capacity
    /// (zero = fail fast)
    pub acquire_timeout: Duration,

    /// Pause between acquire attempts while waiting for a free connection
    pub acquire_retry_interval: Duration,

    /// Enable TCP_NODELAY on broker sockets
    pub tcp_nodelay: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_conn_per_address: 10,
            io_timeout: Some(Duration::from_secs(3)),
            acquire_timeout: Duration::ZERO,
            acquire_retry_interval: Duration::from_millis(10),
            tcp_nodelay: true,
        }
    }
}

impl PoolConfig {
    /// Set the per-address connection cap
    pub fn max_conn_per_address(mut self, max: usize) -> Self {
        self.max_conn_per_address = max;
        self
    }

    /// Set the connect/IO timeout (zero disables deadlines)
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = if timeout.is_zero() {
            None
        } else {
            Some(timeout)
        };
        self
    }

    /// Set the acquire wait timeout
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the pause between acquire attempts
    pub fn acquire_retry_interval(mut self, interval: Duration) -> Self {
        self.acquire_retry_interval = interval;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}
