//! HTTP client for peer providers
//!
//! Two calls go out to other providers: collecting a peer's local audience
//! for a topic, and forwarding a publish job (relay within the cluster,
//! bridge across clusters). Forwarding is fire-and-forget per peer.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use super::envelope::{Envelope, OnlineData, OnlineQuery};
use crate::error::RemoteError;
use crate::scheduler::PublishJob;

/// Produces authentication headers for an outbound body
///
/// The header names and signature scheme belong to the deployment.
pub trait RequestSigner: Send + Sync {
    fn sign(&self, invoker: &str, body: &[u8]) -> Vec<(String, String)>;
}

/// Signer that adds no headers
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsigned;

impl RequestSigner for Unsigned {
    fn sign(&self, _invoker: &str, _body: &[u8]) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Shared client for every peer call
#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
    signer: Arc<dyn RequestSigner>,
}

impl PeerClient {
    /// Create a client whose connect and whole-request deadlines are `timeout`
    pub fn new(timeout: Duration) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Connect(e.to_string()))?;

        Ok(Self {
            http,
            signer: Arc::new(Unsigned),
        })
    }

    /// Use `signer` for forwarded publish requests
    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = signer;
        self
    }

    /// Ask the peer at `addr` for its local audience on `topic`
    pub async fn collect_online(
        &self,
        addr: &str,
        path: &str,
        topic: &str,
    ) -> Result<i64, RemoteError> {
        let query = OnlineQuery {
            topic: topic.to_string(),
        };
        let body = serde_json::to_vec(&query).map_err(|e| RemoteError::Body(e.to_string()))?;

        let envelope: Envelope<OnlineData> = self.post_json(addr, path, body, Vec::new()).await?;
        match envelope.into_result()? {
            Some(data) => Ok(data.online),
            None => Err(RemoteError::Body("missing online data".into())),
        }
    }

    /// Forward `job` to one peer, signed as `invoker`
    pub async fn forward_publish(
        &self,
        addr: &str,
        path: &str,
        invoker: &str,
        job: &PublishJob,
    ) -> Result<(), RemoteError> {
        let body = serde_json::to_vec(job).map_err(|e| RemoteError::Body(e.to_string()))?;
        let headers = self.signer.sign(invoker, &body);

        let envelope: Envelope<serde_json::Value> =
            self.post_json(addr, path, body, headers).await?;
        envelope.into_result()?;
        Ok(())
    }

    /// Forward `job` to every peer in `addrs` without waiting
    pub fn broadcast_publish(&self, addrs: &[String], path: &str, invoker: &str, job: &PublishJob) {
        for addr in addrs {
            let client = self.clone();
            let addr = addr.clone();
            let path = path.to_string();
            let invoker = invoker.to_string();
            let job = job.clone();

            tokio::spawn(async move {
                match client.forward_publish(&addr, &path, &invoker, &job).await {
                    Ok(()) => tracing::info!(
                        peer = %addr,
                        path = %path,
                        upstream_id = %job.upstream_id,
                        "Forwarded publish to peer"
                    ),
                    Err(e) => tracing::error!(
                        peer = %addr,
                        path = %path,
                        upstream_id = %job.upstream_id,
                        error = %e,
                        "Forward publish failed"
                    ),
                }
            });
        }
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        addr: &str,
        path: &str,
        body: Vec<u8>,
        headers: Vec<(String, String)>,
    ) -> Result<T, RemoteError> {
        let url = format!("http://{}{}", addr, path);
        tracing::debug!(url = %url, "Peer request");

        let mut request = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Connect(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(RemoteError::Status(status.as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| RemoteError::Body(e.to_string()))
    }
}

impl std::fmt::Debug for PeerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerClient").finish_non_exhaustive()
    }
}
