//! `selective-repeat`: reliable message delivery over a lossy datagram channel.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────────┐  start / data / end   ┌────────────────────┐
//!  │  ReliableSender  │──────────────────────▶│  ReliableReceiver  │
//!  │  (SrSender +     │                       │  (SrReceiver +     │
//!  │   RetransmitTimer│◀──────────────────────│   FIFO queue)      │
//!  └────────┬─────────┘   cumulative + SACK   └─────────┬──────────┘
//!           │                                           │
//!  ┌────────▼───────────────────────────────────────────▼──────────┐
//!  │  DatagramChannel / DatagramSink                               │
//!  │  MemoryChannel · LossyChannel · UdpChannel · UdpReply         │
//!  └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Modules:
//! - [`packet`]: checksummed wire format for start/data/end/ack
//! - [`frame`]: role + transfer id envelope for shared UDP sockets
//! - [`seq`]: wrap-aware sequence arithmetic and message chunking
//! - [`window`]: in-flight set and reassembly buffer
//! - [`state`]: lifecycle phases
//! - [`sender`] / [`receiver`]: the pure Selective Repeat state machines
//! - [`timer`]: the retransmission timer
//! - [`channel`], [`socket`], [`simulator`]: transports
//! - [`transfer`]: async drivers tying machines to channels
//! - [`server`]: one UDP socket serving many transfers
//! - [`config`]: tunables and their validation

pub mod channel;
pub mod config;
pub mod frame;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod seq;
pub mod server;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;
pub mod transfer;
pub mod window;

pub use channel::{ChannelError, DatagramChannel, DatagramSink, MemoryChannel};
pub use config::{ConfigError, TransportConfig};
pub use packet::{Packet, PacketError, PacketType};
pub use sender::TransferStats;
pub use server::{Server, ServerError};
pub use transfer::{ReliableReceiver, ReliableSender};
