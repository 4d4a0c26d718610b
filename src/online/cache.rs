//! Online-count cache with stale-while-revalidate reads
//!
//! Two scopes: `Local` counts this cluster's brokers, `Total` adds every
//! peer provider on top of the cached local count. A read returns:
//!
//! - the cached count if it is fresh
//! - the cached count if it is stale, after starting one background refresh
//! - the result of a synchronous refresh if the topic was never seen
//!
//! Expiry tasks flip every entry of a scope to stale on their own interval,
//! and a slower janitor drops entries that are still stale.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::collector::OnlineCollector;

/// Which audience a count covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Brokers of this cluster
    Local,
    /// This cluster plus every peer provider
    Total,
}

/// One cached count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub count: i64,
    pub expired: bool,
}

#[derive(Debug, Default)]
struct ScopeCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    refreshing: Mutex<HashSet<String>>,
}

impl ScopeCache {
    fn get(&self, topic: &str) -> Option<CacheEntry> {
        self.entries.lock().get(topic).copied()
    }

    fn store(&self, topic: &str, count: i64) {
        self.entries.lock().insert(
            topic.to_string(),
            CacheEntry {
                count,
                expired: false,
            },
        );
    }

    fn expire_all(&self) -> usize {
        let mut entries = self.entries.lock();
        for entry in entries.values_mut() {
            entry.expired = true;
        }
        entries.len()
    }

    fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.expired);
        before - entries.len()
    }

    /// Claim the background refresh slot for `topic`
    fn begin_refresh(&self, topic: &str) -> bool {
        self.refreshing.lock().insert(topic.to_string())
    }

    fn end_refresh(&self, topic: &str) {
        self.refreshing.lock().remove(topic);
    }

    fn snapshot(&self) -> HashMap<String, i64> {
        self.entries
            .lock()
            .iter()
            .map(|(topic, entry)| (topic.clone(), entry.count))
            .collect()
    }
}

/// Cached audience counts per topic
pub struct OnlineCache {
    collector: OnlineCollector,
    local: ScopeCache,
    total: ScopeCache,
}

impl OnlineCache {
    pub fn new(collector: OnlineCollector) -> Self {
        Self {
            collector,
            local: ScopeCache::default(),
            total: ScopeCache::default(),
        }
    }

    /// Read the audience for `topic` in `scope`
    pub async fn get_online(self: &Arc<Self>, scope: Scope, topic: &str) -> i64 {
        match scope {
            Scope::Local => self.read_local(topic).await,
            Scope::Total => self.read_total(topic).await,
        }
    }

    async fn read_local(self: &Arc<Self>, topic: &str) -> i64 {
        match self.local.get(topic) {
            Some(entry) => {
                if entry.expired && self.local.begin_refresh(topic) {
                    let cache = Arc::clone(self);
                    let topic = topic.to_string();
                    tokio::spawn(async move {
                        cache.refresh_local(&topic).await;
                        cache.local.end_refresh(&topic);
                    });
                }
                entry.count
            }
            None => self.refresh_local(topic).await,
        }
    }

    async fn read_total(self: &Arc<Self>, topic: &str) -> i64 {
        match self.total.get(topic) {
            Some(entry) => {
                if entry.expired && self.total.begin_refresh(topic) {
                    let cache = Arc::clone(self);
                    let topic = topic.to_string();
                    tokio::spawn(async move {
                        cache.refresh_total(&topic).await;
                        cache.total.end_refresh(&topic);
                    });
                }
                entry.count
            }
            None => self.refresh_total(topic).await,
        }
    }

    async fn refresh_local(&self, topic: &str) -> i64 {
        let collected = self.collector.collect_local(topic).await;
        if collected.had_error {
            tracing::warn!(topic = %topic, online = collected.online, "Local online is partial");
        }
        self.local.store(topic, collected.online);
        collected.online
    }

    async fn refresh_total(self: &Arc<Self>, topic: &str) -> i64 {
        let local = self.read_local(topic).await;
        let peers = self.collector.collect_peers(topic).await;
        if peers.had_error {
            tracing::warn!(topic = %topic, online = peers.online, "Peer online is partial");
        }

        let total = local + peers.online;
        self.total.store(topic, total);
        total
    }

    /// Current cache entry, without triggering a refresh
    pub fn entry(&self, scope: Scope, topic: &str) -> Option<CacheEntry> {
        self.scope(scope).get(topic)
    }

    /// Mark every entry of `scope` stale
    pub fn expire(&self, scope: Scope) -> usize {
        self.scope(scope).expire_all()
    }

    /// Drop every stale entry from both scopes
    pub fn purge_expired(&self) -> usize {
        self.local.purge_expired() + self.total.purge_expired()
    }

    /// Cached counts of `scope`, stale ones included
    pub fn snapshot(&self, scope: Scope) -> HashMap<String, i64> {
        self.scope(scope).snapshot()
    }

    /// Spawn the per-scope expiry tasks and the janitor
    pub fn spawn_expiry_tasks(
        self: &Arc<Self>,
        local_expire: Duration,
        total_expire: Duration,
        purge_interval: Duration,
    ) -> Vec<JoinHandle<()>> {
        let expire = |scope: Scope, period: Duration| {
            let cache = Arc::clone(self);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;

                loop {
                    ticker.tick().await;
                    let marked = cache.expire(scope);
                    tracing::trace!(scope = ?scope, marked, "Online cache expired");
                }
            })
        };

        let cache = Arc::clone(self);
        let janitor = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(purge_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let purged = cache.purge_expired();
                tracing::info!(purged, "Online cache purged");
            }
        });

        vec![
            expire(Scope::Local, local_expire),
            expire(Scope::Total, total_expire),
            janitor,
        ]
    }

    fn scope(&self, scope: Scope) -> &ScopeCache {
        match scope {
            Scope::Local => &self.local,
            Scope::Total => &self.total,
        }
    }
}
