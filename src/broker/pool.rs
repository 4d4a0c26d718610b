//! Broker connection pool
//!
//! One lock guards the connection lists of every address. `acquire` scans
//! the list under that lock, probing each idle connection with a live ping:
//! the first healthy one is checked out, unhealthy ones are closed and
//! removed in place. If nothing idle survives and the address is below its
//! cap, a new connection is dialed. Eviction is lazy: a dead connection
//! lingers until the next acquire on its address walks over it.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::config::PoolConfig;
use super::connection::BrokerConnection;
use crate::error::{BrokerError, Result};

/// Lifecycle of a pooled connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Available for checkout (still probed before reuse)
    Idle,
    /// Checked out to exactly one caller
    InUse,
    /// Returned after a failure; evicted on the next scan
    Dead,
}

struct Slot {
    state: Mutex<SlotState>,
    conn: Arc<AsyncMutex<BrokerConnection>>,
}

impl Slot {
    fn new(conn: BrokerConnection, state: SlotState) -> Self {
        Self {
            state: Mutex::new(state),
            conn: Arc::new(AsyncMutex::new(conn)),
        }
    }

    fn state(&self) -> SlotState {
        *self.state.lock()
    }

    fn set_state(&self, state: SlotState) {
        *self.state.lock() = state;
    }
}

/// Pool of broker connections keyed by address
pub struct BrokerPool {
    config: PoolConfig,
    slots: AsyncMutex<HashMap<String, Vec<Arc<Slot>>>>,
}

impl BrokerPool {
    /// Create an empty pool
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            slots: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Check out a healthy connection to `addr`
    ///
    /// Retries while the address is at capacity until `acquire_timeout`
    /// elapses; a zero timeout fails on the first full scan.
    pub async fn acquire(&self, addr: &str) -> Result<PooledConnection> {
        let started = Instant::now();

        loop {
            {
                let mut slots = self.slots.lock().await;
                let list = slots.entry(addr.to_string()).or_default();

                if let Some(conn) = Self::checkout_idle(addr, list).await {
                    return Ok(conn);
                }

                if list.len() < self.config.max_conn_per_address {
                    let conn = BrokerConnection::connect(addr, &self.config).await?;
                    let slot = Arc::new(Slot::new(conn, SlotState::InUse));
                    list.push(Arc::clone(&slot));

                    tracing::debug!(
                        broker = %addr,
                        pooled = list.len(),
                        "New broker connection checked out"
                    );
                    return Ok(PooledConnection::checkout(slot).await);
                }
            }

            let waited = started.elapsed();
            if waited >= self.config.acquire_timeout {
                return Err(BrokerError::NoConnection {
                    addr: addr.to_string(),
                    reason: format!(
                        "pool exhausted ({} in use) after {}ms",
                        self.config.max_conn_per_address,
                        waited.as_millis()
                    ),
                }
                .into());
            }

            tokio::time::sleep(self.config.acquire_retry_interval).await;
        }
    }

    /// Scan for the first healthy idle connection, evicting unhealthy ones
    async fn checkout_idle(addr: &str, list: &mut Vec<Arc<Slot>>) -> Option<PooledConnection> {
        let mut index = 0;

        while index < list.len() {
            let slot = Arc::clone(&list[index]);
            if slot.state() == SlotState::InUse {
                index += 1;
                continue;
            }

            let mut guard = match Arc::clone(&slot.conn).try_lock_owned() {
                Ok(guard) => guard,
                Err(_) => {
                    index += 1;
                    continue;
                }
            };

            if guard.is_healthy().await {
                slot.set_state(SlotState::InUse);
                return Some(PooledConnection { slot, conn: guard });
            }

            guard.close().await;
            drop(guard);
            list.remove(index);

            tracing::debug!(
                broker = %addr,
                pooled = list.len(),
                "Evicted unhealthy broker connection"
            );
        }

        None
    }

    /// Number of pooled connections (idle + in use) for `addr`
    pub async fn connection_count(&self, addr: &str) -> usize {
        self.slots.lock().await.get(addr).map_or(0, Vec::len)
    }

    /// Pooled connection counts for each of `addrs`
    pub async fn connection_counts(&self, addrs: &[String]) -> HashMap<String, usize> {
        let slots = self.slots.lock().await;
        addrs
            .iter()
            .map(|addr| (addr.clone(), slots.get(addr).map_or(0, Vec::len)))
            .collect()
    }
}

/// A checked-out connection; dropping it releases it back to the pool
pub struct PooledConnection {
    slot: Arc<Slot>,
    conn: OwnedMutexGuard<BrokerConnection>,
}

impl PooledConnection {
    async fn checkout(slot: Arc<Slot>) -> Self {
        let conn = Arc::clone(&slot.conn).lock_owned().await;
        Self { slot, conn }
    }

    /// Return the connection to the pool
    ///
    /// No re-validation happens here; a connection that failed is parked as
    /// `Dead` and evicted by the next scan.
    pub fn release(self) {}
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("addr", &self.conn.addr())
            .field("state", &self.slot.state())
            .field("dead", &self.conn.is_dead())
            .finish()
    }
}

impl Deref for PooledConnection {
    type Target = BrokerConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for PooledConnection {
    // The guard is released right after this runs; a scan that races it
    // sees the lock still held and skips the slot for that pass.
    fn drop(&mut self) {
        let dead = self.conn.is_dead();
        self.slot.set_state(if dead {
            SlotState::Dead
        } else {
            SlotState::Idle
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::Error;
    use crate::test_support::MockBroker;

    fn pool(max: usize) -> BrokerPool {
        BrokerPool::new(
            PoolConfig::default()
                .max_conn_per_address(max)
                .io_timeout(Duration::from_millis(500)),
        )
    }

    #[tokio::test]
    async fn test_reuses_released_connection() {
        let broker = MockBroker::start().await;
        let pool = pool(2);

        let conn = pool.acquire(&broker.addr()).await.unwrap();
        conn.release();
        let conn = pool.acquire(&broker.addr()).await.unwrap();
        conn.release();

        assert_eq!(pool.connection_count(&broker.addr()).await, 1);
        assert_eq!(broker.accepted(), 1);
        // Reuse probes the idle connection first
        assert_eq!(broker.pings(), 1);
    }

    #[tokio::test]
    async fn test_held_checkouts_are_distinct() {
        let broker = MockBroker::start().await;
        let pool = pool(2);

        let mut a = pool.acquire(&broker.addr()).await.unwrap();
        let mut b = pool.acquire(&broker.addr()).await.unwrap();

        assert_eq!(pool.connection_count(&broker.addr()).await, 2);
        // Both are independently usable
        assert!(a.is_healthy().await);
        assert!(b.is_healthy().await);
        assert_eq!(broker.accepted(), 2);
    }

    #[tokio::test]
    async fn test_contended_checkouts_never_share_a_connection() {
        let broker = MockBroker::start().await;
        let max = 2;
        let pool = Arc::new(BrokerPool::new(
            PoolConfig::default()
                .max_conn_per_address(max)
                .io_timeout(Duration::from_millis(500))
                .acquire_timeout(Duration::from_secs(5))
                .acquire_retry_interval(Duration::from_millis(2)),
        ));
        let held = Arc::new(Mutex::new(HashSet::new()));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let held = Arc::clone(&held);
                let peak = Arc::clone(&peak);
                let addr = broker.addr();
                tokio::spawn(async move {
                    for _ in 0..3 {
                        let conn = pool.acquire(&addr).await.unwrap();
                        let local = conn.local_addr().unwrap();
                        {
                            let mut held = held.lock();
                            assert!(held.insert(local), "{local} checked out twice");
                            peak.fetch_max(held.len(), Ordering::Relaxed);
                        }
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        held.lock().remove(&local);
                        conn.release();
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::Relaxed) <= max);
        assert!(pool.connection_count(&broker.addr()).await <= max);
        assert!(broker.accepted() <= max);
    }

    #[tokio::test]
    async fn test_capacity_is_never_exceeded() {
        let broker = MockBroker::start().await;
        let pool = pool(1);

        let held = pool.acquire(&broker.addr()).await.unwrap();
        let err = pool.acquire(&broker.addr()).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Broker(BrokerError::NoConnection { .. })
        ));
        assert_eq!(pool.connection_count(&broker.addr()).await, 1);
        drop(held);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let broker = MockBroker::start().await;
        let pool = Arc::new(BrokerPool::new(
            PoolConfig::default()
                .max_conn_per_address(1)
                .io_timeout(Duration::from_millis(500))
                .acquire_timeout(Duration::from_secs(2)),
        ));

        let held = pool.acquire(&broker.addr()).await.unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            let addr = broker.addr();
            tokio::spawn(async move { pool.acquire(&addr).await.map(|c| c.release()) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        held.release();

        waiter.await.unwrap().unwrap();
        assert_eq!(pool.connection_count(&broker.addr()).await, 1);
    }

    #[tokio::test]
    async fn test_dead_connection_evicted_on_next_scan() {
        let broker = MockBroker::start().await;
        let pool = pool(2);

        broker.fail_queries(true);
        let mut conn = pool.acquire(&broker.addr()).await.unwrap();
        assert!(conn.query_topic_online("room1").await.is_err());
        conn.release();
        broker.fail_queries(false);

        // Dead entry stays pooled until something scans the address
        assert_eq!(pool.connection_count(&broker.addr()).await, 1);

        let mut conn = pool.acquire(&broker.addr()).await.unwrap();
        assert!(!conn.is_dead());
        assert_eq!(conn.query_topic_online("room1").await.unwrap(), 0);
        conn.release();

        assert_eq!(pool.connection_count(&broker.addr()).await, 1);
        assert_eq!(broker.accepted(), 2);
    }

    #[tokio::test]
    async fn test_dial_failure_adds_nothing() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let pool = pool(2);
        let err = pool.acquire(&addr).await.unwrap_err();

        assert!(matches!(err, Error::Broker(BrokerError::Connect { .. })));
        assert_eq!(pool.connection_count(&addr).await, 0);
    }

    #[tokio::test]
    async fn test_connection_counts() {
        let a = MockBroker::start().await;
        let b = MockBroker::start().await;
        let pool = pool(2);

        let _held = pool.acquire(&a.addr()).await.unwrap();
        let counts = pool.connection_counts(&[a.addr(), b.addr()]).await;

        assert_eq!(counts[&a.addr()], 1);
        assert_eq!(counts[&b.addr()], 0);
    }
}
