//! Async drivers for the two state machines.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │ send_message(bytes)                     completed messages ▲
//!      ▼                                                            │
//!  ReliableSender                                    ReliableReceiver
//!    ├── SrSender (window, acks)                       ├── SrReceiver (reassembly)
//!    ├── RetransmitTimer                               └── FIFO queue (mpsc)
//!    └── DatagramChannel ────── start/data/end ──────▶ DatagramSink
//!                        ◀───────────── ack ──────────
//! ```
//!
//! [`ReliableSender::send_message`] is synchronous from the caller's point
//! of view: it returns once the `end` handshake completes and never gives
//! up on loss.  [`ReliableReceiver::on_packet_received`] is push-driven:
//! whoever reads datagrams (a [`crate::server::Server`], or
//! [`ReliableReceiver::run`] on a dedicated channel) calls it once per
//! datagram.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;

use crate::channel::{ChannelError, DatagramChannel, DatagramSink};
use crate::config::{ConfigError, TransportConfig};
use crate::packet::{Packet, PacketType};
use crate::receiver::{ReceiverAction, SrReceiver};
use crate::sender::{SrSender, TransferStats};
use crate::seq::{choose_base_seq, chunk_message, ranges_overlap, transfer_span};
use crate::state::ReceiverPhase;
use crate::timer::RetransmitTimer;

// ---------------------------------------------------------------------------
// ReliableSender
// ---------------------------------------------------------------------------

/// Random draws before [`ReliableSender`] stops looking for a base clear of
/// the previous transfer.
const BASE_SEQ_DRAWS: usize = 64;

/// Delivers whole messages over a [`DatagramChannel`], one transfer at a time.
pub struct ReliableSender<C> {
    channel: C,
    config: TransportConfig,
    rng: StdRng,
    /// `(base, span)` of the previous transfer.  The next one must not
    /// overlap it, or late acks for the old transfer would be taken for
    /// acks of the new one.
    last_range: Option<(u32, u64)>,
}

impl<C: DatagramChannel> ReliableSender<C> {
    pub fn new(channel: C, config: TransportConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            channel,
            config,
            rng: StdRng::from_os_rng(),
            last_range: None,
        })
    }

    /// Replace the RNG used to pick base sequence numbers.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Reliably deliver `message` to the peer.
    ///
    /// Returns after the receiver has acknowledged the closing `end` packet.
    /// Loss is handled by retransmission without limit, so under permanent
    /// total loss this never returns.  Only a failing channel produces an
    /// error.
    pub async fn send_message(&mut self, message: &[u8]) -> Result<TransferStats, ChannelError> {
        let chunks = chunk_message(message, self.config.chunk_size);
        let base_seq = self.next_base_seq(chunks.len());
        let mut sender = SrSender::new(base_seq, chunks, self.config.window_size);
        let mut timer = RetransmitTimer::new(self.config.retransmission_timeout);

        log::debug!(
            "[sr:send] transfer base={base_seq} chunks={} window={}",
            sender.total_chunks(),
            sender.window_size()
        );

        let start = sender.start_packet();
        self.handshake(&mut sender, &start, &mut timer).await?;
        sender.on_start_acked();

        self.pipeline(&mut sender, &mut timer).await?;

        let end = sender.end_packet();
        self.handshake(&mut sender, &end, &mut timer).await?;
        sender.on_end_acked();

        let stats = sender.stats();
        log::info!(
            "[sr:send] delivered {} byte(s) in {} chunk(s), {} retransmission(s)",
            message.len(),
            stats.chunks,
            stats.retransmissions
        );
        Ok(stats)
    }

    /// Draw a base whose sequence range is disjoint from the previous
    /// transfer's.  Falls back to the first number past the previous range
    /// when the configured base range leaves no room.
    fn next_base_seq(&mut self, chunks: usize) -> u32 {
        let (min, span) = (self.config.base_seq_min, self.config.base_seq_span);
        let len = transfer_span(chunks);
        let Some((prev, prev_len)) = self.last_range else {
            let base = choose_base_seq(&mut self.rng, min, span);
            self.last_range = Some((base, len));
            return base;
        };

        let drawn = (0..BASE_SEQ_DRAWS)
            .map(|_| choose_base_seq(&mut self.rng, min, span))
            .find(|&base| !ranges_overlap(prev, prev_len, base, len));
        let base = drawn.unwrap_or_else(|| prev.wrapping_add(prev_len as u32));
        self.last_range = Some((base, len));
        base
    }

    /// Send a control packet and wait for the ack naming `seq + 1`,
    /// retransmitting on every timeout.
    async fn handshake(
        &self,
        sender: &mut SrSender,
        packet: &Packet,
        timer: &mut RetransmitTimer,
    ) -> Result<(), ChannelError> {
        let bytes = packet.encode();
        self.channel.send(&bytes).await?;
        sender.record_handshake_tx(false);
        log::debug!("[sr:send] → {} seq={}", packet.kind, packet.seq);
        timer.arm();

        loop {
            tokio::select! {
                result = self.channel.recv() => {
                    let Some(ack) = decode_ack(&result?) else { continue };
                    if SrSender::acks_handshake(&ack, packet.seq) {
                        timer.disarm();
                        log::debug!("[sr:send] ← ack={} for {}", ack.seq, packet.kind);
                        return Ok(());
                    }
                }
                _ = timer.expired() => {
                    log::debug!("[sr:send] timeout, resending {} seq={}", packet.kind, packet.seq);
                    self.channel.send(&bytes).await?;
                    sender.record_handshake_tx(true);
                    timer.arm();
                }
            }
        }
    }

    /// Push every chunk through the window until all are acknowledged.
    async fn pipeline(&self, sender: &mut SrSender, timer: &mut RetransmitTimer) -> Result<(), ChannelError> {
        loop {
            for bytes in sender.admit() {
                self.channel.send(&bytes).await?;
            }
            if sender.all_acked() {
                timer.disarm();
                return Ok(());
            }
            if !timer.is_armed() {
                timer.arm();
            }

            tokio::select! {
                result = self.channel.recv() => {
                    let Some(ack) = decode_ack(&result?) else { continue };
                    let freed = sender.on_ack(ack.seq, ack.selective_ack());
                    if freed > 0 {
                        log::trace!(
                            "[sr:send] ← ack={} sack={:?} freed={freed} in_flight={}",
                            ack.seq,
                            ack.selective_ack(),
                            sender.in_flight()
                        );
                        timer.arm();
                    }
                }
                _ = timer.expired() => {
                    let pending = sender.retransmit();
                    log::debug!("[sr:send] timeout, retransmitting {} packet(s)", pending.len());
                    for bytes in pending {
                        self.channel.send(&bytes).await?;
                    }
                    timer.arm();
                }
            }
        }
    }
}

/// Decode an inbound datagram, keeping it only if it is an intact ack.
fn decode_ack(datagram: &[u8]) -> Option<Packet> {
    match Packet::decode(datagram) {
        Ok(packet) if packet.kind == PacketType::Ack => Some(packet),
        Ok(packet) => {
            log::trace!("[sr:send] ignoring inbound {} seq={}", packet.kind, packet.seq);
            None
        }
        Err(e) => {
            log::debug!("[sr:send] dropping inbound datagram: {e}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// ReliableReceiver
// ---------------------------------------------------------------------------

/// Receives one transfer: acks through `sink`, delivers to a FIFO queue.
pub struct ReliableReceiver<S> {
    sink: S,
    machine: SrReceiver,
    completed: mpsc::UnboundedSender<Vec<u8>>,
}

impl<S: DatagramSink> ReliableReceiver<S> {
    pub fn new(
        sink: S,
        config: &TransportConfig,
        completed: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            sink,
            machine: SrReceiver::new(config.window_size),
            completed,
        })
    }

    pub fn phase(&self) -> ReceiverPhase {
        self.machine.phase()
    }

    pub fn machine(&self) -> &SrReceiver {
        &self.machine
    }

    /// Handle one inbound datagram.
    ///
    /// Corrupt or malformed datagrams are dropped without an ack.  Every
    /// other packet the machine accepts gets exactly one ack.  A completed
    /// message is queued before its ack goes out, so a failing channel
    /// cannot lose it.
    pub async fn on_packet_received(&mut self, datagram: &[u8]) -> Result<(), ChannelError> {
        let packet = match Packet::decode(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                log::debug!("[sr:recv] dropping datagram: {e}");
                return Ok(());
            }
        };

        match self.machine.on_packet(&packet) {
            ReceiverAction::Drop => Ok(()),
            ReceiverAction::Ack(ack) => {
                log::trace!("[sr:recv] ← {} seq={} → ack={}", packet.kind, packet.seq, ack.seq);
                self.sink.send(&ack.encode()).await
            }
            ReceiverAction::Complete { ack, message } => {
                log::info!("[sr:recv] message complete ({} byte(s))", message.len());
                if self.completed.send(message).is_err() {
                    log::warn!("[sr:recv] consumer queue closed; message discarded");
                }
                self.sink.send(&ack.encode()).await
            }
        }
    }
}

impl<C: DatagramChannel> ReliableReceiver<C> {
    /// Feed every datagram arriving on the channel into
    /// [`on_packet_received`](Self::on_packet_received) until the channel
    /// closes.
    ///
    /// Keeps running after a transfer completes so a retransmitted `end`
    /// still gets its ack.
    pub async fn run(mut self) -> Result<(), ChannelError> {
        loop {
            let datagram = match self.sink.recv().await {
                Ok(d) => d,
                Err(ChannelError::Closed) => return Ok(()),
                Err(e) => return Err(e),
            };
            match self.on_packet_received(&datagram).await {
                Ok(()) => {}
                Err(ChannelError::Closed) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}
