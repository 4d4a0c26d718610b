//! The provider service
//!
//! `Provider` owns every long-lived piece: clock, admission budgets, broker
//! pool, online cache, scheduler, peer client, decorations and stats. The
//! HTTP layer calls into it; nothing here is global.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::config::ProviderConfig;
use super::decorate::{Decoration, Decorations};
use crate::broker::BrokerPool;
use crate::control::{AdmissionController, Clock};
use crate::error::Result;
use crate::online::{OnlineCache, OnlineCollector, Scope};
use crate::peer::{PeerClient, RequestSigner};
use crate::scheduler::{BrokerDispatcher, PublishJob, PublishRequest, PublishScheduler};
use crate::stats::{ProviderStats, StatsSnapshot};

/// What happened to a publish request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Queued locally (and forwarded where applicable)
    Accepted { upstream_id: String },
    /// Refused by the count budget or without a queue for its weight
    Dropped,
}

impl PublishOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PublishOutcome::Accepted { .. })
    }
}

/// Cached topics ordered by audience
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineRanking {
    /// Sum over every cached topic
    pub total_online: i64,
    pub topic_count: usize,
    pub show_count: usize,
    /// Largest first, `show_count` entries
    pub topics: Vec<(String, i64)>,
}

/// Broadcast provider instance
pub struct Provider {
    config: ProviderConfig,
    clock: Arc<Clock>,
    admission: Arc<AdmissionController>,
    pool: Arc<BrokerPool>,
    online: Arc<OnlineCache>,
    scheduler: Arc<PublishScheduler<BrokerDispatcher>>,
    peers: PeerClient,
    decorations: Decorations,
    stats: Arc<ProviderStats>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Provider {
    /// Build a provider; background tasks start with [`Provider::start`]
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;
        let peers = PeerClient::new(config.http_rpc_timeout)?;
        Ok(Self::build(config, peers))
    }

    /// Build a provider that signs forwarded publishes with `signer`
    pub fn with_signer(config: ProviderConfig, signer: Arc<dyn RequestSigner>) -> Result<Self> {
        config.validate()?;
        let peers = PeerClient::new(config.http_rpc_timeout)?.with_signer(signer);
        Ok(Self::build(config, peers))
    }

    fn build(config: ProviderConfig, peers: PeerClient) -> Self {
        let clock = Arc::new(Clock::new());
        let admission = Arc::new(AdmissionController::new(
            config.max_publish_count,
            config.max_publish_qps,
            config.max_weight,
        ));
        let pool = Arc::new(BrokerPool::new(config.pool.clone()));
        let stats = Arc::new(ProviderStats::new());

        let collector = OnlineCollector::new(
            Arc::clone(&pool),
            config.broker_addrs.clone(),
            peers.clone(),
            config.relay_addrs.clone(),
            config.collect_online_path.clone(),
        );
        let online = Arc::new(OnlineCache::new(collector));

        let dispatcher = BrokerDispatcher::new(
            Arc::clone(&pool),
            Arc::clone(&online),
            Arc::clone(&admission),
            config.broker_addrs.clone(),
            Arc::clone(&stats),
        );
        let scheduler = Arc::new(PublishScheduler::new(
            config.max_weight,
            Arc::clone(&admission),
            Arc::clone(&clock),
            dispatcher,
            Arc::clone(&stats),
        ));

        let decorations = Decorations::new(config.decorations.clone());

        Self {
            config,
            clock,
            admission,
            pool,
            online,
            scheduler,
            peers,
            decorations,
            stats,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the clock, cache maintenance and consumer workers
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        tasks.push(self.clock.spawn(Arc::clone(&self.admission)));
        tasks.extend(self.online.spawn_expiry_tasks(
            self.config.local_online_expire,
            self.config.total_online_expire,
            self.config.online_purge_interval,
        ));
        tasks.extend(
            self.scheduler
                .spawn_consumers(self.config.consumer_concurrency),
        );

        tracing::info!(
            brokers = self.config.broker_addrs.len(),
            relays = self.config.relay_addrs.len(),
            bridges = self.config.bridge_addrs.len(),
            consumers = self.config.consumer_concurrency,
            max_weight = self.config.max_weight,
            "Provider started"
        );
    }

    /// Abort every background task
    pub fn shutdown(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        if tasks.is_empty() {
            return;
        }
        for task in tasks {
            task.abort();
        }
        tracing::info!("Provider stopped");
    }

    /// Accept a publish from a client
    ///
    /// Queues it locally, relays it within the cluster and, when asked,
    /// bridges it to other clusters.
    pub async fn publish(&self, request: PublishRequest) -> PublishOutcome {
        if !self.admit(&request.upstream_id, &request.topic) {
            return PublishOutcome::Dropped;
        }

        let mut job = PublishJob::from_request(request, self.admission.max_weight());
        if job.upstream_id.is_empty() {
            job.upstream_id = uuid::Uuid::new_v4().simple().to_string();
        }
        job.online_snapshot = self.online(&job.topic).await;

        let outcome = self.push_local(job.clone());

        self.relay_in_cluster(&job);
        if job.bridge && !self.config.bridge_addrs.is_empty() {
            self.peers.broadcast_publish(
                &self.config.bridge_addrs,
                &self.config.bridge_publish_path,
                &self.config.bridge_invoker,
                &job,
            );
        }

        outcome
    }

    /// Accept a publish relayed by a provider of this cluster
    ///
    /// Already admitted at its origin; only queued locally.
    pub fn relay_publish(&self, mut job: PublishJob) -> PublishOutcome {
        job.normalize(self.admission.max_weight());
        self.push_local(job)
    }

    /// Accept a publish bridged from another cluster
    ///
    /// Admitted again here, and its audience is recomputed for this cluster
    /// before it is queued and relayed.
    pub async fn bridge_publish(&self, mut job: PublishJob) -> PublishOutcome {
        if !self.admit(&job.upstream_id, &job.topic) {
            return PublishOutcome::Dropped;
        }

        job.normalize(self.admission.max_weight());
        job.online_snapshot = self.online(&job.topic).await;

        let outcome = self.push_local(job.clone());
        self.relay_in_cluster(&job);
        outcome
    }

    fn admit(&self, upstream_id: &str, topic: &str) -> bool {
        if self.admission.try_admit_message() {
            self.stats.record_admitted();
            return true;
        }

        tracing::warn!(
            upstream_id = %upstream_id,
            topic = %topic,
            max_count = self.admission.max_count(),
            "Publish count budget exceeded, message dropped"
        );
        self.stats.record_rejected();
        false
    }

    fn push_local(&self, mut job: PublishJob) -> PublishOutcome {
        job.pub_time = self.clock.now();
        let upstream_id = job.upstream_id.clone();

        if self.scheduler.collect_publish(job, false) {
            PublishOutcome::Accepted { upstream_id }
        } else {
            PublishOutcome::Dropped
        }
    }

    fn relay_in_cluster(&self, job: &PublishJob) {
        if self.config.relay_addrs.is_empty() {
            return;
        }
        self.peers.broadcast_publish(
            &self.config.relay_addrs,
            &self.config.relay_publish_path,
            &self.config.relay_invoker,
            job,
        );
    }

    /// Decorated audience across every cluster member
    pub async fn online(&self, topic: &str) -> i64 {
        match self.decorations.resolve(topic) {
            Decoration::Fixed(value) => value,
            scale => scale.apply(self.online.get_online(Scope::Total, topic).await),
        }
    }

    /// Undecorated audience on this provider's brokers; what peers collect
    pub async fn local_online(&self, topic: &str) -> i64 {
        self.online.get_online(Scope::Local, topic).await
    }

    /// Undecorated audience across every cluster member
    pub async fn pure_online(&self, topic: &str) -> i64 {
        self.online.get_online(Scope::Total, topic).await
    }

    /// Cached topics of `scope`, largest audience first
    ///
    /// `show` of zero (or more than the topic count) lists every topic.
    pub fn online_ranking(&self, scope: Scope, show: usize) -> OnlineRanking {
        let mut topics: Vec<(String, i64)> = self.online.snapshot(scope).into_iter().collect();
        topics.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let topic_count = topics.len();
        let total_online: i64 = topics.iter().map(|(_, count)| count).sum();
        let show_count = if show == 0 || show >= topic_count {
            topic_count
        } else {
            show
        };
        topics.truncate(show_count);

        OnlineRanking {
            total_online,
            topic_count,
            show_count,
            topics,
        }
    }

    /// Change the per-second publish count and resize the arrival signal
    pub fn set_max_publish_count(&self, count: i64) {
        self.admission.set_max_count(count);
        self.scheduler.resize_signal(count.max(1) as usize);
        tracing::info!(max_count = count, "Publish count ceiling changed");
    }

    pub fn set_max_publish_qps(&self, qps: i64) {
        self.admission.set_max_qps(qps);
        tracing::info!(max_qps = qps, "Publish qps ceiling changed");
    }

    /// Change the highest weight accepted and served
    ///
    /// Queues exist only up to the startup maximum; jobs above it are dropped.
    pub fn set_max_publish_weight(&self, weight: usize) {
        if weight > self.scheduler.max_weight() {
            tracing::warn!(
                max_weight = weight,
                queues = self.scheduler.max_weight(),
                "Max weight above startup value, heavier jobs will be dropped"
            );
        }
        self.admission.set_max_weight(weight);
    }

    pub fn max_publish_count(&self) -> i64 {
        self.admission.max_count()
    }

    pub fn max_publish_qps(&self) -> i64 {
        self.admission.max_qps()
    }

    pub fn max_publish_weight(&self) -> usize {
        self.admission.max_weight()
    }

    /// Decoration factor stored under exactly `topic`
    pub fn decoration(&self, topic: &str) -> Option<f64> {
        self.decorations.get(topic)
    }

    pub fn set_decoration(&self, topic: impl Into<String>, factor: f64) {
        self.decorations.set(topic, factor);
    }

    /// Jobs waiting in the scheduler
    pub fn pending_jobs(&self) -> usize {
        self.scheduler.pending()
    }

    /// Pooled connections per configured broker
    pub async fn broker_connections(&self) -> Vec<(String, usize)> {
        let counts = self
            .pool
            .connection_counts(&self.config.broker_addrs)
            .await;
        self.config
            .broker_addrs
            .iter()
            .map(|addr| (addr.clone(), counts.get(addr).copied().unwrap_or(0)))
            .collect()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::scheduler::BrokerPayload;
    use crate::test_support::{
        init_tracing, MockBroker, MockPeer, PeerReply, BRIDGE_PATH, COLLECT_PATH, RELAY_PATH,
    };

    fn config(broker: &MockBroker) -> ProviderConfig {
        let mut config = ProviderConfig::with_brokers(vec![broker.addr()])
            .max_weight(5)
            .max_publish_count(100)
            .max_publish_qps(10_000)
            .consumer_concurrency(2)
            .http_rpc_timeout(Duration::from_secs(2));
        config.collect_online_path = COLLECT_PATH.into();
        config.relay_publish_path = RELAY_PATH.into();
        config.bridge_publish_path = BRIDGE_PATH.into();
        config
    }

    fn request(id: &str, topic: &str) -> PublishRequest {
        PublishRequest {
            upstream_id: id.into(),
            topic: topic.into(),
            payload: "hello".into(),
            weight: 3,
            ..Default::default()
        }
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_publish_reaches_broker() {
        init_tracing();
        let broker = MockBroker::start().await;
        broker.set_online("room1", 4);

        let provider = Provider::new(config(&broker)).unwrap();
        provider.start();

        let outcome = provider.publish(request("up-1", "room1")).await;
        assert_eq!(
            outcome,
            PublishOutcome::Accepted {
                upstream_id: "up-1".into()
            }
        );

        eventually(|| broker.published().len() == 1).await;
        let published = &broker.published()[0];
        assert_eq!(published.publish_id, "up-1");
        assert_eq!(published.topic, "room1");

        let payload: BrokerPayload = serde_json::from_str(&published.message).unwrap();
        assert_eq!(payload.online, 4);
        assert_eq!(payload.datas, "hello");

        eventually(|| provider.stats().dispatched == 1).await;
        assert_eq!(provider.broker_connections().await[0].1, 1);
        provider.shutdown();
    }

    #[tokio::test]
    async fn test_count_budget_drops_silently() {
        let broker = MockBroker::start().await;
        let provider = Provider::new(config(&broker).max_publish_count(2)).unwrap();

        assert!(provider.publish(request("a", "room1")).await.is_accepted());
        assert!(provider.publish(request("b", "room1")).await.is_accepted());
        assert_eq!(
            provider.publish(request("c", "room1")).await,
            PublishOutcome::Dropped
        );

        assert_eq!(provider.pending_jobs(), 2);
        let stats = provider.stats();
        assert_eq!(stats.admitted, 2);
        assert_eq!(stats.rejected, 1);
    }

    #[tokio::test]
    async fn test_missing_id_is_generated() {
        let broker = MockBroker::start().await;
        let provider = Provider::new(config(&broker)).unwrap();

        let PublishOutcome::Accepted { upstream_id } = provider.publish(request("", "room1")).await
        else {
            panic!("publish dropped");
        };
        assert_eq!(upstream_id.len(), 32);
        assert!(upstream_id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_relay_and_bridge_forwarding() {
        let broker = MockBroker::start().await;
        broker.set_online("room1", 6);
        let relay = MockPeer::start(PeerReply::Online(4)).await;
        let bridge = MockPeer::start(PeerReply::Online(0)).await;

        let provider = Provider::new(
            config(&broker)
                .relay_addrs(vec![relay.addr()])
                .bridge_addrs(vec![bridge.addr()]),
        )
        .unwrap();

        provider.publish(request("plain", "room1")).await;
        let mut bridged = request("bridged", "room1");
        bridged.bridge = true;
        provider.publish(bridged).await;

        eventually(|| relay.relayed().len() == 2 && bridge.relayed().len() == 1).await;

        let forwarded = &bridge.relayed()[0];
        assert_eq!(forwarded.upstream_id, "bridged");
        // Total audience: 6 on the broker plus 4 on the relay peer
        assert_eq!(forwarded.online_snapshot, 10);
        assert_eq!(forwarded.weight, 3);
    }

    #[tokio::test]
    async fn test_relay_publish_skips_admission_and_forwarding() {
        let broker = MockBroker::start().await;
        let relay = MockPeer::start(PeerReply::Online(0)).await;
        let provider =
            Provider::new(config(&broker).max_publish_count(1).relay_addrs(vec![relay.addr()]))
                .unwrap();

        assert!(provider.publish(request("a", "room1")).await.is_accepted());
        assert!(!provider.publish(request("b", "room1")).await.is_accepted());

        let mut job = PublishJob::from_request(request("from-peer", "room1"), 5);
        job.weight = 50;
        assert!(provider.relay_publish(job).is_accepted());
        assert_eq!(provider.pending_jobs(), 2);

        eventually(|| relay.relayed().len() == 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(relay.relayed().len(), 1);
        assert_eq!(relay.relayed()[0].upstream_id, "a");
    }

    #[tokio::test]
    async fn test_bridge_publish_recomputes_audience() {
        let broker = MockBroker::start().await;
        broker.set_online("room1", 8);
        let relay = MockPeer::start(PeerReply::Online(2)).await;
        let provider = Provider::new(config(&broker).relay_addrs(vec![relay.addr()])).unwrap();

        let mut job = PublishJob::from_request(request("remote", "room1"), 5);
        job.online_snapshot = 999;
        assert!(provider.bridge_publish(job).await.is_accepted());

        eventually(|| relay.relayed().len() == 1).await;
        assert_eq!(relay.relayed()[0].online_snapshot, 10);
    }

    #[tokio::test]
    async fn test_decorated_online() {
        let broker = MockBroker::start().await;
        broker.set_online("room1", 10);
        let provider = Provider::new(config(&broker).decoration("default", 1.5)).unwrap();

        assert_eq!(provider.online("room1").await, 15);
        assert_eq!(provider.pure_online("room1").await, 10);
        assert_eq!(provider.local_online("room1").await, 10);

        provider.set_decoration("fixed", -300.0);
        assert_eq!(provider.online("fixed").await, 300);
        assert_eq!(broker.queries(), 1);
        assert_eq!(provider.decoration("fixed"), Some(-300.0));
    }

    #[tokio::test]
    async fn test_online_ranking() {
        let broker = MockBroker::start().await;
        broker.set_online("a", 5);
        broker.set_online("b", 20);
        broker.set_online("c", 1);
        let provider = Provider::new(config(&broker)).unwrap();

        for topic in ["a", "b", "c"] {
            provider.local_online(topic).await;
        }

        let ranking = provider.online_ranking(Scope::Local, 2);
        assert_eq!(ranking.total_online, 26);
        assert_eq!(ranking.topic_count, 3);
        assert_eq!(ranking.show_count, 2);
        assert_eq!(
            ranking.topics,
            vec![("b".to_string(), 20), ("a".to_string(), 5)]
        );

        let all = provider.online_ranking(Scope::Local, 0);
        assert_eq!(all.show_count, 3);
        assert!(provider.online_ranking(Scope::Total, 0).topics.is_empty());
    }

    #[tokio::test]
    async fn test_runtime_ceilings() {
        let broker = MockBroker::start().await;
        let provider = Provider::new(config(&broker).max_publish_count(1)).unwrap();

        assert!(provider.publish(request("a", "room1")).await.is_accepted());
        assert!(!provider.publish(request("b", "room1")).await.is_accepted());

        provider.set_max_publish_count(3);
        assert_eq!(provider.max_publish_count(), 3);
        assert!(provider.publish(request("c", "room1")).await.is_accepted());

        provider.set_max_publish_qps(7);
        assert_eq!(provider.max_publish_qps(), 7);

        provider.set_max_publish_weight(2);
        let PublishOutcome::Accepted { .. } = provider.publish(request("d", "room1")).await else {
            panic!("publish dropped");
        };
        assert_eq!(provider.max_publish_weight(), 2);
        assert_eq!(provider.scheduler.queue_len(2), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Provider::new(ProviderConfig::default().consumer_concurrency(0)).err();
        assert!(matches!(err, Some(crate::error::Error::Config(_))));
    }
}
