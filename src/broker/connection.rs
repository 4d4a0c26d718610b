//! A single TCP connection to one broker
//!
//! Any send/receive failure or protocol mismatch marks the connection dead.
//! The flag is sticky: a dead connection never becomes healthy again and is
//! closed the next time the pool scans past it.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::config::PoolConfig;
use crate::error::{BrokerError, Error, Result};
use crate::protocol::constants::PINGRESP;
use crate::protocol::{read_packet, write_packet, Packet};

/// Connection to one broker address
#[derive(Debug)]
pub struct BrokerConnection {
    addr: String,
    stream: TcpStream,
    timeout: Option<Duration>,
    dead: bool,
}

impl BrokerConnection {
    /// Dial `addr`, bounded by the configured timeout
    pub async fn connect(addr: &str, config: &PoolConfig) -> Result<Self> {
        let dial = TcpStream::connect(addr);
        let stream = match config.io_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, dial).await {
                Ok(result) => result,
                Err(_) => Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                )),
            },
            None => dial.await,
        }
        .map_err(|source| BrokerError::Connect {
            addr: addr.to_string(),
            source,
        })?;

        if config.tcp_nodelay {
            stream.set_nodelay(true)?;
        }

        tracing::debug!(broker = %addr, "Broker connection established");

        Ok(Self {
            addr: addr.to_string(),
            stream,
            timeout: config.io_timeout,
            dead: false,
        })
    }

    /// Broker address this connection talks to
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Local end of the socket
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.local_addr()?)
    }

    /// Whether a write/protocol error has been recorded
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Round-trip a PINGREQ/PINGRESP
    pub async fn ping(&mut self) -> Result<()> {
        let result = self.exchange(Packet::ping_req()).await.and_then(|resp| {
            resp.expect_command(PINGRESP)?;
            Ok(())
        });
        self.mark_dead_on_error(result)
    }

    /// Send a PURE_PUB frame without waiting for an answer
    pub async fn publish_pure_message(
        &mut self,
        publish_id: &str,
        topic: &str,
        payload: &str,
    ) -> Result<()> {
        if self.dead {
            return Err(BrokerError::Dead.into());
        }
        let packet = Packet::pure_publish(publish_id, topic, payload)?;
        let result = self.send(&packet).await;
        self.mark_dead_on_error(result)
    }

    /// Ask the broker how many clients are online for `topic`
    pub async fn query_topic_online(&mut self, topic: &str) -> Result<u32> {
        if self.dead {
            return Err(BrokerError::Dead.into());
        }
        let packet = Packet::query_online(topic)?;
        let result = self
            .exchange(packet)
            .await
            .and_then(|resp| Ok(resp.to_online_count()?));
        self.mark_dead_on_error(result)
    }

    /// Active liveness probe; a dead connection fails without touching the wire
    pub async fn is_healthy(&mut self) -> bool {
        if self.dead {
            return false;
        }
        self.ping().await.is_ok()
    }

    /// Shut the socket down
    pub async fn close(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(broker = %self.addr, error = %e, "Broker socket shutdown failed");
        }
        tracing::debug!(broker = %self.addr, "Broker connection closed");
    }

    async fn exchange(&mut self, packet: Packet) -> Result<Packet> {
        self.send(&packet).await?;
        let timeout = self.timeout;
        with_deadline(timeout, read_packet(&mut self.stream)).await
    }

    async fn send(&mut self, packet: &Packet) -> Result<()> {
        let timeout = self.timeout;
        with_deadline(timeout, write_packet(&mut self.stream, packet)).await
    }

    fn mark_dead_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result {
            if !self.dead {
                tracing::debug!(broker = %self.addr, error = %e, "Broker connection marked dead");
            }
            self.dead = true;
        }
        result
    }
}

async fn with_deadline<F, T>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(timeout) => match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Broker(BrokerError::Timeout)),
        },
        None => fut.await,
    }
}
