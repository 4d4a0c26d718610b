//! Publish jobs
//!
//! A job is created when a publish request is admitted and lives until it
//! is delivered or dropped. Its JSON form is what peers exchange on relay
//! and bridge; scheduling fields (`ttl`, `pub_time`, `invoker`) stay local.

use serde::{Deserialize, Serialize};

/// A validated publish request handed over by the HTTP layer
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    /// Caller-supplied id; empty means "generate one"
    pub upstream_id: String,
    pub topic: String,
    /// Also forward to other clusters
    pub bridge: bool,
    pub payload: String,
    /// Raw priority, clamped to `[1, max_weight]` on admission
    pub weight: i64,
    /// Authenticated caller name
    pub invoker: String,
}

/// A message waiting in (or moving through) the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishJob {
    #[serde(rename = "UpstreamId", default)]
    pub upstream_id: String,

    #[serde(rename = "Topic")]
    pub topic: String,

    #[serde(rename = "Bridge", default)]
    pub bridge: bool,

    #[serde(rename = "Msg")]
    pub payload: String,

    #[serde(rename = "Weight", default)]
    pub weight: i64,

    /// Decorated audience size when the job was accepted
    #[serde(rename = "Online", default)]
    pub online_snapshot: i64,

    /// Seconds the job may wait in its queue
    #[serde(skip)]
    pub ttl: i64,

    /// Unix second of local acceptance
    #[serde(skip)]
    pub pub_time: i64,

    #[serde(skip)]
    pub invoker: String,
}

impl PublishJob {
    /// Build a job from an incoming request
    pub fn from_request(request: PublishRequest, max_weight: usize) -> Self {
        let mut job = Self {
            upstream_id: request.upstream_id,
            topic: request.topic,
            bridge: request.bridge,
            payload: request.payload,
            weight: request.weight,
            online_snapshot: 0,
            ttl: 0,
            pub_time: 0,
            invoker: request.invoker,
        };
        job.normalize(max_weight);
        job
    }

    /// Clamp the weight into `[1, max_weight]` and derive the TTL from it
    pub fn normalize(&mut self, max_weight: usize) {
        let max_weight = max_weight.max(1) as i64;
        self.weight = self.weight.clamp(1, max_weight);
        self.ttl = self.weight;
    }

    /// Whether the TTL ran out as of `now`
    pub fn is_expired(&self, now: i64) -> bool {
        self.pub_time + self.ttl < now
    }
}

/// JSON body carried in the PURE_PUB message field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerPayload {
    pub id: String,
    pub online: i64,
    /// Messages in this payload; always one
    pub total: u32,
    pub datas: String,
}

impl From<&PublishJob> for BrokerPayload {
    fn from(job: &PublishJob) -> Self {
        Self {
            id: job.upstream_id.clone(),
            online: job.online_snapshot,
            total: 1,
            datas: job.payload.clone(),
        }
    }
}
