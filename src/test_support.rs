//! In-process doubles for brokers and peer providers

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::peer::{Envelope, OnlineData, OnlineQuery};
use crate::protocol::constants::*;
use crate::protocol::{read_packet, write_packet, Packet, PurePublish};
use crate::scheduler::PublishJob;

#[derive(Default)]
struct BrokerState {
    online: Mutex<HashMap<String, u32>>,
    published: Mutex<Vec<PurePublish>>,
    accepted: AtomicUsize,
    pings: AtomicUsize,
    queries: AtomicUsize,
    fail_queries: AtomicBool,
    silent: AtomicBool,
}

/// Broker double speaking the wire protocol on a loopback port
pub struct MockBroker {
    addr: String,
    state: Arc<BrokerState>,
    accept_task: JoinHandle<()>,
}

impl MockBroker {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(BrokerState::default());

        let accept_state = Arc::clone(&state);
        let accept_task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accept_state.accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(socket, Arc::clone(&accept_state)));
            }
        });

        Self {
            addr,
            state,
            accept_task,
        }
    }

    pub fn addr(&self) -> String {
        self.addr.clone()
    }

    pub fn set_online(&self, topic: &str, online: u32) {
        self.state.online.lock().insert(topic.to_string(), online);
    }

    /// Answer QUERY_ONLINE with the wrong opcode
    pub fn fail_queries(&self, fail: bool) {
        self.state.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Read frames but never answer
    pub fn set_silent(&self, silent: bool) {
        self.state.silent.store(silent, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PurePublish> {
        self.state.published.lock().clone()
    }

    pub fn accepted(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.state.pings.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.state.queries.load(Ordering::SeqCst)
    }
}

impl Drop for MockBroker {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve(mut socket: TcpStream, state: Arc<BrokerState>) {
    while let Ok(packet) = read_packet(&mut socket).await {
        if state.silent.load(Ordering::SeqCst) {
            continue;
        }

        let reply = match packet.command() {
            PINGREQ => {
                state.pings.fetch_add(1, Ordering::SeqCst);
                Some(Packet::ping_resp())
            }
            QUERY_ONLINE => {
                state.queries.fetch_add(1, Ordering::SeqCst);
                if state.fail_queries.load(Ordering::SeqCst) {
                    Some(Packet::ping_resp())
                } else {
                    let topic = packet.to_query_topic().unwrap_or_default();
                    let online = state.online.lock().get(&topic).copied().unwrap_or(0);
                    Some(Packet::query_online_ack(online))
                }
            }
            PURE_PUB => {
                if let Ok(publish) = packet.to_pure_publish() {
                    state.published.lock().push(publish);
                }
                None
            }
            _ => None,
        };

        if let Some(reply) = reply {
            if write_packet(&mut socket, &reply).await.is_err() {
                break;
            }
        }
    }
}

/// How a mock peer answers collect-online requests
#[derive(Debug, Clone, Copy)]
pub enum PeerReply {
    Online(i64),
    HttpError(u16),
    AppError(i64),
}

struct PeerState {
    reply: Mutex<PeerReply>,
    collects: AtomicUsize,
    relayed: Mutex<Vec<PublishJob>>,
}

/// Peer provider double serving the collect/relay/bridge endpoints
pub struct MockPeer {
    addr: String,
    state: Arc<PeerState>,
    task: JoinHandle<()>,
}

pub const COLLECT_PATH: &str = "/provider/v1/online/collect";
pub const RELAY_PATH: &str = "/provider/v1/publish/relay";
pub const BRIDGE_PATH: &str = "/provider/v1/publish/bridge";

impl MockPeer {
    pub async fn start(reply: PeerReply) -> Self {
        let state = Arc::new(PeerState {
            reply: Mutex::new(reply),
            collects: AtomicUsize::new(0),
            relayed: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route(COLLECT_PATH, post(collect))
            .route(RELAY_PATH, post(relay))
            .route(BRIDGE_PATH, post(relay))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state, task }
    }

    pub fn addr(&self) -> String {
        self.addr.clone()
    }

    pub fn collects(&self) -> usize {
        self.state.collects.load(Ordering::SeqCst)
    }

    pub fn relayed(&self) -> Vec<PublishJob> {
        self.state.relayed.lock().clone()
    }
}

impl Drop for MockPeer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn collect(
    State(state): State<Arc<PeerState>>,
    Json(_query): Json<OnlineQuery>,
) -> (axum::http::StatusCode, Json<Envelope<OnlineData>>) {
    state.collects.fetch_add(1, Ordering::SeqCst);
    let reply = *state.reply.lock();
    match reply {
        PeerReply::Online(online) => (
            axum::http::StatusCode::OK,
            Json(Envelope::ok(OnlineData { online })),
        ),
        PeerReply::HttpError(status) => (
            axum::http::StatusCode::from_u16(status).unwrap(),
            Json(Envelope::error(status as i64, "unavailable")),
        ),
        PeerReply::AppError(code) => (
            axum::http::StatusCode::OK,
            Json(Envelope::error(code, "system busy")),
        ),
    }
}

async fn relay(
    State(state): State<Arc<PeerState>>,
    Json(job): Json<PublishJob>,
) -> Json<Envelope<OnlineData>> {
    state.relayed.lock().push(job);
    Json(Envelope::empty())
}

/// Install a test log subscriber once
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
