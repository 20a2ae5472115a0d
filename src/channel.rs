//! Datagram channel abstraction.
//!
//! The protocol needs very little from its transport: send an opaque
//! datagram to the peer, and receive the next datagram from it.  Delivery
//! may drop, reorder or duplicate; the channel itself is assumed to stay
//! operable, so any [`ChannelError`] is fatal to the transfer using it.
//!
//! - [`DatagramSink`]: the send half.  Enough for a receiver, which only
//!   ever answers with acks.
//! - [`DatagramChannel`]: send and receive.  The sender needs both.
//! - [`MemoryChannel`]: a connected in-process pair, used by tests and by
//!   anything that wants the protocol without a socket.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The other end of the channel is gone.
    #[error("channel closed")]
    Closed,
}

#[async_trait]
pub trait DatagramSink: Send + Sync {
    /// Hand one datagram to the transport.  Success says nothing about
    /// whether it will arrive.
    async fn send(&self, datagram: &[u8]) -> Result<(), ChannelError>;
}

#[async_trait]
pub trait DatagramChannel: DatagramSink {
    /// Wait for the next datagram from the peer.
    ///
    /// Must be cancel-safe: the sender races it against its retransmission
    /// timer and drops the losing future.
    async fn recv(&self) -> Result<Vec<u8>, ChannelError>;

    /// Like [`recv`](Self::recv), but gives up after `timeout`.  `Ok(None)`
    /// means nothing arrived in time, which is not an error.
    async fn recv_timeout(&self, timeout: Duration) -> Result<Option<Vec<u8>>, ChannelError> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(result) => result.map(Some),
            Err(_elapsed) => Ok(None),
        }
    }
}

#[async_trait]
impl<T: DatagramSink + ?Sized> DatagramSink for std::sync::Arc<T> {
    async fn send(&self, datagram: &[u8]) -> Result<(), ChannelError> {
        (**self).send(datagram).await
    }
}

#[async_trait]
impl<T: DatagramChannel + ?Sized> DatagramChannel for std::sync::Arc<T> {
    async fn recv(&self) -> Result<Vec<u8>, ChannelError> {
        (**self).recv().await
    }
}

/// One end of an in-memory, loss-free datagram link.
#[derive(Debug)]
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryChannel {
    /// Two connected endpoints: what one sends, the other receives.
    pub fn pair() -> (MemoryChannel, MemoryChannel) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            MemoryChannel { tx: a_tx, rx: Mutex::new(a_rx) },
            MemoryChannel { tx: b_tx, rx: Mutex::new(b_rx) },
        )
    }
}

#[async_trait]
impl DatagramSink for MemoryChannel {
    async fn send(&self, datagram: &[u8]) -> Result<(), ChannelError> {
        self.tx.send(datagram.to_vec()).map_err(|_| ChannelError::Closed)
    }
}

#[async_trait]
impl DatagramChannel for MemoryChannel {
    async fn recv(&self) -> Result<Vec<u8>, ChannelError> {
        self.rx.lock().await.recv().await.ok_or(ChannelError::Closed)
    }
}
