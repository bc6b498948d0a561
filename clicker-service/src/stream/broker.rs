use async_trait::async_trait;
use shared::Result;
use std::sync::{Arc, Weak};
use tracing::debug;

use super::publisher::PublisherInner;

/// A message ready for the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub payload: Vec<u8>,
    pub persistent: bool,
}

/// An established channel to the broker.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    async fn publish(&self, queue: &str, message: &OutboundMessage) -> Result<()>;

    fn is_connected(&self) -> bool;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Opens a connection and a channel, and declares `queue` as durable
    /// before returning. The implementation must call `lost.notify` when the
    /// underlying connection closes or errors.
    async fn connect(&self, queue: &str, lost: ConnectionLost) -> Result<Arc<dyn BrokerChannel>>;
}

/// Handed to a [`Broker`] on every connect. Notifications for a connection
/// the publisher has already replaced are ignored. One that fires before
/// `connect` has returned marks the attempt as lost.
#[derive(Clone)]
pub struct ConnectionLost {
    publisher: Weak<PublisherInner>,
    generation: u64,
}

impl ConnectionLost {
    pub(crate) fn new(publisher: Weak<PublisherInner>, generation: u64) -> Self {
        Self {
            publisher,
            generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Safe to call from any thread, including broker I/O threads outside
    /// the tokio runtime.
    pub fn notify(&self, reason: &str) {
        match self.publisher.upgrade() {
            Some(publisher) => publisher.connection_lost(self.generation, reason),
            None => debug!(
                generation = self.generation,
                "Connection lost after publisher was dropped"
            ),
        }
    }
}
