//! Receiving side over UDP: one socket, many concurrent transfers.
//!
//! ```text
//!                     ┌──────────────────────────────┐
//!  datagram ────────▶ │ Server::run                  │
//!  (peer, frame)      │   decode Frame               │
//!                     │   role == Sender ?           │
//!                     │   key = (peer, transfer_id)  │
//!                     └──────┬───────────────────────┘
//!                            │ body
//!              ┌─────────────┼─────────────┐
//!              ▼             ▼             ▼
//!      ReliableReceiver  ReliableReceiver  ...     (one per key)
//!              │             │
//!              └──── acks via UdpReply (shared socket) ───▶ peer
//!
//!      completed messages ──▶ mpsc::UnboundedReceiver<Vec<u8>>
//! ```
//!
//! Transfers are created on the first frame for their key.  A transfer that
//! has not been heard from for `transfer_linger` is evicted; a live sender
//! retransmits every RTO, so silence that long means it has finished or gone.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::channel::ChannelError;
use crate::config::{ConfigError, TransportConfig};
use crate::frame::{Frame, Role};
use crate::socket::{Socket, UdpReply};
use crate::transfer::ReliableReceiver;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

struct Transfer {
    receiver: ReliableReceiver<UdpReply>,
    last_seen: Instant,
}

pub struct Server {
    socket: Arc<Socket>,
    config: TransportConfig,
    completed: mpsc::UnboundedSender<Vec<u8>>,
    transfers: HashMap<(SocketAddr, u32), Transfer>,
}

impl Server {
    /// Bind the server socket.  Completed messages from every transfer
    /// arrive, in completion order, on the returned receiver.
    pub async fn bind(
        addr: SocketAddr,
        config: TransportConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Vec<u8>>), ServerError> {
        config.validate()?;
        let socket = Socket::bind(addr, config.receive_buffer_size).await?;
        log::info!("[sr:server] listening on {}", socket.local_addr);

        let (completed, messages) = mpsc::unbounded_channel();
        let server = Self {
            socket: Arc::new(socket),
            config,
            completed,
            transfers: HashMap::new(),
        };
        Ok((server, messages))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    pub fn active_transfers(&self) -> usize {
        self.transfers.len()
    }

    /// Serve until the socket fails.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let mut sweep = time::interval(self.config.transfer_linger);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                result = self.socket.recv_from() => {
                    let (bytes, peer) = match result {
                        Ok(received) => received,
                        Err(ChannelError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                            // ICMP port unreachable from a peer that went away.
                            log::debug!("[sr:server] {e}; ignored");
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };
                    self.dispatch(&bytes, peer).await;
                }
                _ = sweep.tick() => self.evict_idle(Instant::now()),
            }
        }
    }

    /// Route one datagram to its transfer.
    async fn dispatch(&mut self, bytes: &[u8], peer: SocketAddr) {
        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("[sr:server] undecodable datagram from {peer}: {e}");
                return;
            }
        };
        if frame.role != Role::Sender {
            log::trace!("[sr:server] receiver-role frame from {peer}; ignored");
            return;
        }

        let key = (peer, frame.transfer_id);
        let transfer = match self.transfers.entry(key) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let reply = UdpReply::new(Arc::clone(&self.socket), peer, frame.transfer_id);
                let receiver = match ReliableReceiver::new(reply, &self.config, self.completed.clone()) {
                    Ok(receiver) => receiver,
                    Err(e) => {
                        log::error!("[sr:server] cannot create receiver: {e}");
                        return;
                    }
                };
                log::debug!("[sr:server] new transfer {} from {peer}", frame.transfer_id);
                entry.insert(Transfer {
                    receiver,
                    last_seen: Instant::now(),
                })
            }
        };

        transfer.last_seen = Instant::now();
        if let Err(e) = transfer.receiver.on_packet_received(&frame.body).await {
            log::warn!("[sr:server] ack to {peer} for transfer {} failed: {e}", frame.transfer_id);
        }
    }

    fn evict_idle(&mut self, now: Instant) {
        let linger = self.config.transfer_linger;
        let before = self.transfers.len();
        self.transfers.retain(|(peer, id), t| {
            let keep = now.duration_since(t.last_seen) < linger;
            if !keep {
                log::debug!(
                    "[sr:server] evicting transfer {id} from {peer} (phase {})",
                    t.receiver.phase()
                );
            }
            keep
        });
        if self.transfers.len() != before {
            log::trace!("[sr:server] {} transfer(s) active", self.transfers.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use crate::state::ReceiverPhase;
    use std::time::Duration;

    async fn server(linger: Duration) -> (Server, mpsc::UnboundedReceiver<Vec<u8>>, Socket) {
        let config = TransportConfig {
            transfer_linger: linger,
            ..TransportConfig::default()
        };
        let (server, rx) = Server::bind("127.0.0.1:0".parse().unwrap(), config).await.unwrap();
        let client = Socket::bind("127.0.0.1:0".parse().unwrap(), 4096).await.unwrap();
        (server, rx, client)
    }

    fn frame(role: Role, id: u32, packet: Packet) -> Vec<u8> {
        Frame { role, transfer_id: id, body: packet.encode() }.encode()
    }

    #[tokio::test]
    async fn dispatch_creates_and_routes_transfers() {
        let (mut server, mut rx, client) = server(Duration::from_secs(30)).await;
        let peer = client.local_addr;

        server.dispatch(&frame(Role::Sender, 1, Packet::start(100)), peer).await;
        server.dispatch(&frame(Role::Sender, 2, Packet::start(500)), peer).await;
        assert_eq!(server.active_transfers(), 2);

        server.dispatch(&frame(Role::Sender, 1, Packet::data(101, b"one".to_vec())), peer).await;
        server.dispatch(&frame(Role::Sender, 1, Packet::end(102)), peer).await;
        assert_eq!(rx.recv().await.unwrap(), b"one");

        let t2 = &server.transfers[&(peer, 2)];
        assert_eq!(t2.receiver.phase(), ReceiverPhase::Receiving);

        let (ack, _) = client.recv_from().await.unwrap();
        let ack = Frame::decode(&ack).unwrap();
        assert_eq!(ack.role, Role::Receiver);
        assert_eq!(ack.transfer_id, 1);
        assert_eq!(Packet::decode(&ack.body).unwrap().seq, 101);
    }

    #[tokio::test]
    async fn ignores_receiver_frames_and_garbage() {
        let (mut server, _rx, client) = server(Duration::from_secs(30)).await;
        let peer = client.local_addr;
        server.dispatch(&frame(Role::Receiver, 1, Packet::start(100)), peer).await;
        server.dispatch(b"zz", peer).await;
        assert_eq!(server.active_transfers(), 0);
    }

    #[tokio::test]
    async fn idle_transfers_are_evicted() {
        let (mut server, _rx, client) = server(Duration::from_millis(100)).await;
        let peer = client.local_addr;
        server.dispatch(&frame(Role::Sender, 7, Packet::start(100)), peer).await;

        server.evict_idle(Instant::now());
        assert_eq!(server.active_transfers(), 1);
        server.evict_idle(Instant::now() + Duration::from_millis(150));
        assert_eq!(server.active_transfers(), 0);
    }

    #[tokio::test]
    async fn invalid_config_rejected_at_bind() {
        let config = TransportConfig { chunk_size: 0, ..TransportConfig::default() };
        let result = Server::bind("127.0.0.1:0".parse().unwrap(), config).await;
        assert!(matches!(result, Err(ServerError::Config(ConfigError::ZeroChunkSize))));
    }
}
