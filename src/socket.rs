//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that owns
//! only byte I/O.  On top of it sit the two framed endpoints the rest of the
//! crate talks to:
//!
//! - [`UdpChannel`]: a full [`DatagramChannel`] bound to one peer and one
//!   transfer id; the sending side of a transfer uses this.
//! - [`UdpReply`]: a send-only [`DatagramSink`] over a shared socket; the
//!   server answers each transfer through one of these.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::channel::{ChannelError, DatagramChannel, DatagramSink};
use crate::frame::{Frame, Role};

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// An async, datagram-oriented UDP socket.
///
/// All methods are `&self` so the socket can be shared across tasks.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after the OS assigns an
    /// ephemeral port).
    pub local_addr: SocketAddr,
    receive_buffer_size: usize,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `127.0.0.1:0` lets the OS choose an ephemeral port.
    /// Datagrams longer than `receive_buffer_size` are truncated by the OS
    /// and will then fail to decode.
    pub async fn bind(local_addr: SocketAddr, receive_buffer_size: usize) -> Result<Self, ChannelError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            local_addr,
            receive_buffer_size,
            inner,
        })
    }

    /// Send `bytes` as a single UDP datagram to `dest`.
    pub async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), ChannelError> {
        self.inner.send_to(bytes, dest).await?;
        Ok(())
    }

    /// Receive the next datagram.  Returns `(bytes, sender_address)`.
    pub async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), ChannelError> {
        let mut buf = vec![0u8; self.receive_buffer_size];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }
}

// ---------------------------------------------------------------------------
// UdpChannel
// ---------------------------------------------------------------------------

/// One side of a transfer over UDP.
///
/// Outbound packets are framed with this endpoint's role and transfer id.
/// Inbound datagrams are accepted only when they come from `peer`, carry
/// the opposite role and the same transfer id; everything else is skipped.
#[derive(Debug)]
pub struct UdpChannel {
    socket: Socket,
    peer: SocketAddr,
    role: Role,
    transfer_id: u32,
}

impl UdpChannel {
    pub fn new(socket: Socket, peer: SocketAddr, role: Role, transfer_id: u32) -> Self {
        Self {
            socket,
            peer,
            role,
            transfer_id,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    pub fn transfer_id(&self) -> u32 {
        self.transfer_id
    }
}

#[async_trait]
impl DatagramSink for UdpChannel {
    async fn send(&self, datagram: &[u8]) -> Result<(), ChannelError> {
        let frame = Frame {
            role: self.role,
            transfer_id: self.transfer_id,
            body: datagram.to_vec(),
        };
        self.socket.send_to(&frame.encode(), self.peer).await
    }
}

#[async_trait]
impl DatagramChannel for UdpChannel {
    async fn recv(&self) -> Result<Vec<u8>, ChannelError> {
        loop {
            let (bytes, addr) = self.socket.recv_from().await?;
            if addr != self.peer {
                log::trace!("[sr:udp] datagram from unexpected {addr}; skipped");
                continue;
            }
            match Frame::decode(&bytes) {
                Ok(frame) if frame.role == self.role.peer() && frame.transfer_id == self.transfer_id => {
                    return Ok(frame.body);
                }
                Ok(frame) => {
                    log::trace!(
                        "[sr:udp] frame for transfer {} role {:?}; skipped",
                        frame.transfer_id,
                        frame.role
                    );
                }
                Err(e) => log::debug!("[sr:udp] undecodable frame from {addr}: {e}"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// UdpReply
// ---------------------------------------------------------------------------

/// Send-only endpoint answering one transfer through a shared socket.
#[derive(Debug, Clone)]
pub struct UdpReply {
    socket: Arc<Socket>,
    peer: SocketAddr,
    transfer_id: u32,
}

impl UdpReply {
    pub fn new(socket: Arc<Socket>, peer: SocketAddr, transfer_id: u32) -> Self {
        Self {
            socket,
            peer,
            transfer_id,
        }
    }
}

#[async_trait]
impl DatagramSink for UdpReply {
    async fn send(&self, datagram: &[u8]) -> Result<(), ChannelError> {
        let frame = Frame {
            role: Role::Receiver,
            transfer_id: self.transfer_id,
            body: datagram.to_vec(),
        };
        self.socket.send_to(&frame.encode(), self.peer).await
    }
}
