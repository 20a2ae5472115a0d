//! Selective-Repeat send-side state machine.
//!
//! [`SrSender`] owns one outbound transfer: the chunked message, the window
//! of in-flight packets and the phase of the `start`/`end` handshakes.
//!
//! # Protocol contract
//!
//! - Chunk `i` travels at sequence number `base_seq + 1 + i`.
//! - At most `window_size` chunks are unacknowledged at once.  A chunk may
//!   enter the window only while it lies within `window_size` of the lowest
//!   unacknowledged chunk (`send_base`).
//! - Acks are handled two ways: the cumulative number `n` frees every
//!   in-flight chunk below `n`, and the selective number frees exactly the
//!   chunk it names.
//! - On timeout, the caller retransmits only the packets still in the
//!   window, never the whole range.
//!
//! This module only manages state; all channel I/O is the caller's
//! responsibility (see [`crate::transfer::ReliableSender`]).

use crate::packet::{Packet, PacketType};
use crate::seq::{chunk_seq, seq_offset};
use crate::state::SenderPhase;
use crate::window::SendWindow;

/// Counters describing one completed (or in-progress) transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Base sequence number the transfer was opened at.
    pub base_seq: u32,
    /// Number of `data` chunks in the message.
    pub chunks: usize,
    /// Every packet handed to the channel, including retransmissions.
    pub transmissions: u64,
    /// Packets sent again after a timeout.
    pub retransmissions: u64,
}

/// Selective-Repeat send-side state for one transfer.
///
/// # Sequence-number layout
///
/// ```text
///  send_base               next_chunk
///      │                       │
///  ────┼───────────────────────┼──────────────────▶ chunk index
///      │ <── sent, some acked ▶│ <── not yet sent ─▶
///      │ <──────── window_size ───────▶│
/// ```
#[derive(Debug)]
pub struct SrSender {
    base_seq: u32,
    chunks: Vec<Vec<u8>>,
    /// Per-chunk acknowledgment flags.
    acked: Vec<bool>,
    /// Index of the lowest chunk not yet acknowledged.
    send_base: usize,
    /// Index of the next chunk that has never been sent.
    next_chunk: usize,
    window: SendWindow,
    phase: SenderPhase,
    stats: TransferStats,
}

impl SrSender {
    /// Create a sender for `chunks`, opened at `base_seq`.
    pub fn new(base_seq: u32, chunks: Vec<Vec<u8>>, window_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        let total = chunks.len();
        Self {
            base_seq,
            acked: vec![false; total],
            chunks,
            send_base: 0,
            next_chunk: 0,
            window: SendWindow::new(base_seq, window_size),
            phase: SenderPhase::Idle,
            stats: TransferStats {
                base_seq,
                chunks: total,
                ..TransferStats::default()
            },
        }
    }

    pub fn base_seq(&self) -> u32 {
        self.base_seq
    }

    pub fn phase(&self) -> SenderPhase {
        self.phase
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Number of packets currently awaiting acknowledgment.
    pub fn in_flight(&self) -> usize {
        self.window.len()
    }

    pub fn window_size(&self) -> usize {
        self.window.capacity()
    }

    /// `true` once every chunk has been acknowledged.
    pub fn all_acked(&self) -> bool {
        self.send_base == self.chunks.len()
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    /// Sequence number of the `end` packet.
    pub fn end_seq(&self) -> u32 {
        chunk_seq(self.base_seq, self.chunks.len())
    }

    /// The `start` packet; moves the sender into [`SenderPhase::Opening`].
    pub fn start_packet(&mut self) -> Packet {
        self.phase = SenderPhase::Opening;
        Packet::start(self.base_seq)
    }

    /// The `end` packet; moves the sender into [`SenderPhase::Closing`].
    pub fn end_packet(&mut self) -> Packet {
        debug_assert!(self.all_acked(), "end requested with chunks outstanding");
        self.phase = SenderPhase::Closing;
        Packet::end(self.end_seq())
    }

    /// `true` when `ack` acknowledges the handshake packet `seq`.
    pub fn acks_handshake(ack: &Packet, seq: u32) -> bool {
        ack.kind == PacketType::Ack && ack.seq == seq.wrapping_add(1)
    }

    pub fn on_start_acked(&mut self) {
        self.phase = SenderPhase::Transferring;
    }

    pub fn on_end_acked(&mut self) {
        self.phase = SenderPhase::Done;
    }

    /// Account for a handshake packet handed to the channel.
    pub fn record_handshake_tx(&mut self, retransmission: bool) {
        self.stats.transmissions += 1;
        if retransmission {
            self.stats.retransmissions += 1;
        }
    }

    /// Admit every chunk that may enter the window now and return the
    /// encoded packets to send, in sequence order.
    ///
    /// Chunks already in flight are never returned here; they only go out
    /// again through [`retransmit`](Self::retransmit).
    pub fn admit(&mut self) -> Vec<Vec<u8>> {
        let limit = (self.send_base + self.window.capacity()).min(self.chunks.len());
        let mut out = Vec::new();
        while self.next_chunk < limit {
            let seq = chunk_seq(self.base_seq, self.next_chunk);
            let bytes = Packet::data(seq, self.chunks[self.next_chunk].clone()).encode();
            self.window.insert(seq, bytes.clone());
            out.push(bytes);
            self.next_chunk += 1;
        }
        self.stats.transmissions += out.len() as u64;
        out
    }

    /// Process an acknowledgment.
    ///
    /// `cumulative` frees every in-flight chunk below it; `selective` frees
    /// the one chunk it names.  Acks naming chunks that were never sent are
    /// ignored.  Returns the number of window slots freed.
    pub fn on_ack(&mut self, cumulative: u32, selective: Option<u32>) -> usize {
        let mut freed = 0;

        // Offset 0 is `start`; chunk i sits at offset i + 1.
        let cum_offset = seq_offset(self.base_seq, cumulative) as usize;
        if cum_offset >= 1 && cum_offset - 1 <= self.next_chunk {
            let upto = cum_offset - 1;
            for idx in self.send_base..upto {
                if !self.acked[idx] {
                    self.acked[idx] = true;
                    self.window.remove(chunk_seq(self.base_seq, idx));
                    freed += 1;
                }
            }
        }

        if let Some(seq) = selective {
            let offset = seq_offset(self.base_seq, seq) as usize;
            if offset >= 1 && offset - 1 < self.next_chunk {
                let idx = offset - 1;
                if !self.acked[idx] {
                    self.acked[idx] = true;
                    self.window.remove(seq);
                    freed += 1;
                }
            }
        }

        while self.send_base < self.chunks.len() && self.acked[self.send_base] {
            self.send_base += 1;
        }
        freed
    }

    /// Raw bytes of every packet still awaiting acknowledgment, oldest
    /// first.  Each is counted as a retransmission.
    pub fn retransmit(&mut self) -> Vec<Vec<u8>> {
        let pending = self.window.pending();
        self.stats.transmissions += pending.len() as u64;
        self.stats.retransmissions += pending.len() as u64;
        pending
    }

    /// `true` while `seq` is sent and unacknowledged.
    pub fn is_in_flight(&self, seq: u32) -> bool {
        self.window.contains(seq)
    }
}
