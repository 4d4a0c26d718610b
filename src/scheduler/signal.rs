//! Arrival signal between producers and consumer workers
//!
//! A bounded channel of unit tokens, one token per pushed job. The capacity
//! equals the per-second message budget: once full, further tokens are
//! handed to a spawned task that waits for room, so producers never block.
//!
//! Resizing swaps in a fresh channel. Consumers still parked on the old one
//! drain its remaining tokens, see it close, and move to the new one.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex as AsyncMutex;

struct Channel {
    tx: mpsc::Sender<()>,
    rx: Arc<AsyncMutex<mpsc::Receiver<()>>>,
}

impl Channel {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Arc::new(AsyncMutex::new(rx)),
        }
    }
}

/// Multi-consumer wake-up signal with bounded buffering
pub struct ArrivalSignal {
    channel: RwLock<Channel>,
}

impl ArrivalSignal {
    pub fn new(capacity: usize) -> Self {
        Self {
            channel: RwLock::new(Channel::new(capacity)),
        }
    }

    /// Offer one token without blocking the caller
    pub fn notify(&self) {
        let tx = self.channel.read().tx.clone();
        match tx.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => {
                tokio::spawn(async move {
                    let _ = tx.send(()).await;
                });
            }
            // Retired by a resize
            Err(TrySendError::Closed(())) => {}
        }
    }

    /// Wait for one token
    pub async fn wait(&self) {
        loop {
            let rx = Arc::clone(&self.channel.read().rx);
            let mut rx = rx.lock().await;
            if rx.recv().await.is_some() {
                return;
            }
        }
    }

    /// Replace the channel with one of a new capacity
    pub fn resize(&self, capacity: usize) {
        *self.channel.write() = Channel::new(capacity);
    }

    /// Configured capacity of the current channel
    pub fn capacity(&self) -> usize {
        self.channel.read().tx.max_capacity()
    }
}
