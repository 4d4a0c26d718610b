//! Fan-out of one job to every broker
//!
//! The qps budget is checked first, against the topic's current local
//! audience. When it is exhausted the job comes back as `Busy` and the
//! scheduler requeues it. Otherwise one detached task per broker acquires a
//! pooled connection and writes a PURE_PUB frame; nobody waits on them.

use std::future::Future;
use std::sync::Arc;

use super::job::{BrokerPayload, PublishJob};
use crate::broker::BrokerPool;
use crate::control::{AdmissionController, QpsAdmission};
use crate::online::{OnlineCache, Scope};
use crate::stats::ProviderStats;

/// Result of handing a job to the delivery layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Fanned out to the brokers
    Sent,
    /// Over the qps budget; try again later
    Busy,
    /// Could not be prepared; dropped
    Failed,
}

/// Delivery backend driven by the scheduler's consumers
pub trait Dispatch: Send + Sync + 'static {
    /// Deliver one job that has passed the TTL check
    fn dispatch(&self, job: &PublishJob) -> impl Future<Output = DispatchOutcome> + Send;
}

/// Delivers jobs to every configured broker through the pool
pub struct BrokerDispatcher {
    pool: Arc<BrokerPool>,
    online: Arc<OnlineCache>,
    admission: Arc<AdmissionController>,
    brokers: Arc<[String]>,
    stats: Arc<ProviderStats>,
}

impl BrokerDispatcher {
    pub fn new(
        pool: Arc<BrokerPool>,
        online: Arc<OnlineCache>,
        admission: Arc<AdmissionController>,
        brokers: Vec<String>,
        stats: Arc<ProviderStats>,
    ) -> Self {
        Self {
            pool,
            online,
            admission,
            brokers: brokers.into(),
            stats,
        }
    }
}

impl Dispatch for BrokerDispatcher {
    async fn dispatch(&self, job: &PublishJob) -> DispatchOutcome {
        let audience = self.online.get_online(Scope::Local, &job.topic).await;

        if let QpsAdmission::Exceeded { total } = self.admission.try_admit_qps(audience) {
            tracing::warn!(
                topic = %job.topic,
                upstream_id = %job.upstream_id,
                audience,
                qps = total,
                max_qps = self.admission.max_qps(),
                "Publish qps budget exceeded"
            );
            return DispatchOutcome::Busy;
        }

        let payload = match serde_json::to_string(&BrokerPayload::from(job)) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(
                    upstream_id = %job.upstream_id,
                    error = %e,
                    "Failed to encode broker payload"
                );
                return DispatchOutcome::Failed;
            }
        };
        let payload: Arc<str> = payload.into();

        for addr in self.brokers.iter() {
            let pool = Arc::clone(&self.pool);
            let stats = Arc::clone(&self.stats);
            let payload = Arc::clone(&payload);
            let addr = addr.clone();
            let upstream_id = job.upstream_id.clone();
            let topic = job.topic.clone();

            tokio::spawn(async move {
                let ok = publish_to_broker(&pool, &addr, &upstream_id, &topic, &payload).await;
                stats.record_broker_publish(ok);
            });
        }

        DispatchOutcome::Sent
    }
}

async fn publish_to_broker(
    pool: &BrokerPool,
    addr: &str,
    upstream_id: &str,
    topic: &str,
    payload: &str,
) -> bool {
    let mut conn = match pool.acquire(addr).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(broker = %addr, upstream_id = %upstream_id, error = %e, "No broker connection");
            return false;
        }
    };

    let result = conn.publish_pure_message(upstream_id, topic, payload).await;
    conn.release();

    match result {
        Ok(()) => {
            tracing::debug!(broker = %addr, upstream_id = %upstream_id, topic = %topic, "Published to broker");
            true
        }
        Err(e) => {
            tracing::error!(broker = %addr, upstream_id = %upstream_id, error = %e, "Broker publish failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::broker::PoolConfig;
    use crate::online::OnlineCollector;
    use crate::peer::PeerClient;
    use crate::test_support::MockBroker;

    fn job(topic: &str) -> PublishJob {
        PublishJob {
            upstream_id: "up-1".into(),
            topic: topic.into(),
            bridge: false,
            payload: "hi".into(),
            weight: 1,
            online_snapshot: 3,
            ttl: 1,
            pub_time: 0,
            invoker: String::new(),
        }
    }

    fn dispatcher(brokers: Vec<String>, max_qps: i64) -> (BrokerDispatcher, Arc<ProviderStats>) {
        let pool = Arc::new(BrokerPool::new(PoolConfig::default()));
        let collector = OnlineCollector::new(
            Arc::clone(&pool),
            brokers.clone(),
            PeerClient::new(Duration::from_secs(1)).unwrap(),
            Vec::new(),
            "/collect".into(),
        );
        let online = Arc::new(OnlineCache::new(collector));
        let admission = Arc::new(AdmissionController::new(100, max_qps, 5));
        let stats = Arc::new(ProviderStats::new());
        let dispatcher =
            BrokerDispatcher::new(pool, online, admission, brokers, Arc::clone(&stats));
        (dispatcher, stats)
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_fan_out_to_every_broker() {
        let a = MockBroker::start().await;
        let b = MockBroker::start().await;
        a.set_online("room1", 4);
        b.set_online("room1", 6);

        let (dispatcher, stats) = dispatcher(vec![a.addr(), b.addr()], 100);
        assert_eq!(dispatcher.dispatch(&job("room1")).await, DispatchOutcome::Sent);

        wait_for(|| a.published().len() == 1 && b.published().len() == 1).await;

        let sent = &a.published()[0];
        assert_eq!(sent.publish_id, "up-1");
        assert_eq!(sent.topic, "room1");
        let payload: BrokerPayload = serde_json::from_str(&sent.message).unwrap();
        assert_eq!(payload.datas, "hi");
        assert_eq!(payload.online, 3);
        assert_eq!(payload.total, 1);

        wait_for(|| stats.snapshot().broker_publishes == 2).await;
    }

    #[tokio::test]
    async fn test_busy_when_audience_exceeds_qps() {
        let broker = MockBroker::start().await;
        broker.set_online("room1", 50);

        let (dispatcher, _stats) = dispatcher(vec![broker.addr()], 80);
        assert_eq!(dispatcher.dispatch(&job("room1")).await, DispatchOutcome::Sent);
        assert_eq!(dispatcher.dispatch(&job("room1")).await, DispatchOutcome::Busy);

        dispatcher.admission.reset();
        assert_eq!(dispatcher.dispatch(&job("room1")).await, DispatchOutcome::Sent);
    }

    #[tokio::test]
    async fn test_unreachable_broker_counts_as_failure() {
        let live = MockBroker::start().await;
        let dead = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let (dispatcher, stats) = dispatcher(vec![live.addr(), dead], 100);
        assert_eq!(dispatcher.dispatch(&job("room1")).await, DispatchOutcome::Sent);

        wait_for(|| {
            let snapshot = stats.snapshot();
            snapshot.broker_publishes == 1 && snapshot.broker_publish_failures == 1
        })
        .await;
        assert_eq!(live.published().len(), 1);
    }
}
