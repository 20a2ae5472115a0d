//! Selective-Repeat receive-side state machine.
//!
//! [`SrReceiver`] accepts the packets of exactly one transfer:
//!
//! - `start` fixes the base and opens the transfer.
//! - `data` is buffered on first arrival, in any order.  Duplicates change
//!   nothing.
//! - Every accepted packet is answered by one `ack` whose number is the
//!   lowest sequence number not yet received (so a gap holds it back), and
//!   whose payload names the data packet that triggered it.
//! - `end` reassembles the chunks in sequence order and hands the message
//!   out exactly once; a repeated `end` is only re-acknowledged.
//!
//! Checksum validation happens before a packet reaches this machine.  This
//! module only manages state; sending the ack and delivering the message is
//! the caller's responsibility (see [`crate::transfer::ReliableReceiver`]).

use crate::packet::{Packet, PacketType};
use crate::seq::seq_offset;
use crate::state::ReceiverPhase;
use crate::window::ReassemblyBuffer;

/// What the caller should do after feeding a packet to the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverAction {
    /// Ignore the packet; send nothing.
    Drop,
    /// Send this acknowledgment.
    Ack(Packet),
    /// Send this acknowledgment and deliver `message` to the consumer.
    Complete { ack: Packet, message: Vec<u8> },
}

/// Selective-Repeat receive-side state for one transfer.
#[derive(Debug)]
pub struct SrReceiver {
    window_size: usize,
    phase: ReceiverPhase,
    /// Sequence number of the `start` packet, once seen.
    start_seq: Option<u32>,
    /// Lowest sequence number not yet cumulatively acknowledged.
    expected_seq: u32,
    /// Sequence number of the `end` packet that completed the transfer.
    end_seq: Option<u32>,
    chunks: ReassemblyBuffer,
}

impl SrReceiver {
    /// `window_size` must match the sender's; it bounds how far ahead of
    /// the cumulative ack a data packet may land and still be buffered.
    pub fn new(window_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            window_size,
            phase: ReceiverPhase::AwaitingStart,
            start_seq: None,
            expected_seq: 0,
            end_seq: None,
            chunks: ReassemblyBuffer::new(),
        }
    }

    pub fn phase(&self) -> ReceiverPhase {
        self.phase
    }

    pub fn start_seq(&self) -> Option<u32> {
        self.start_seq
    }

    /// Lowest sequence number not yet received, once the transfer is open.
    pub fn expected_seq(&self) -> Option<u32> {
        self.start_seq.map(|_| self.expected_seq)
    }

    /// Number of distinct chunks buffered so far.
    pub fn buffered(&self) -> usize {
        self.chunks.chunk_count()
    }

    /// Feed one checksum-valid packet through the machine.
    pub fn on_packet(&mut self, packet: &Packet) -> ReceiverAction {
        match packet.kind {
            PacketType::Start => self.on_start(packet.seq),
            PacketType::Data => self.on_data(packet.seq, &packet.payload),
            PacketType::End => self.on_end(packet.seq),
            // Acks travel the other way.
            PacketType::Ack => ReceiverAction::Drop,
        }
    }

    fn on_start(&mut self, seq: u32) -> ReceiverAction {
        match (self.phase, self.start_seq) {
            (ReceiverPhase::AwaitingStart, _) => {
                self.open(seq);
                ReceiverAction::Ack(Packet::ack(seq.wrapping_add(1), None))
            }
            // Retransmitted start: its ack was lost.
            (_, Some(start)) if start == seq => {
                ReceiverAction::Ack(Packet::ack(seq.wrapping_add(1), None))
            }
            // The transfer id is being reused for a new message.
            (ReceiverPhase::Completed, _) => {
                log::debug!("[sr:recv] new start seq={seq} after completed transfer");
                *self = Self::new(self.window_size);
                self.open(seq);
                ReceiverAction::Ack(Packet::ack(seq.wrapping_add(1), None))
            }
            _ => {
                log::debug!("[sr:recv] foreign start seq={seq} during transfer; dropped");
                ReceiverAction::Drop
            }
        }
    }

    fn open(&mut self, seq: u32) {
        self.start_seq = Some(seq);
        self.expected_seq = seq.wrapping_add(1);
        self.phase = ReceiverPhase::Receiving;
    }

    fn on_data(&mut self, seq: u32, payload: &[u8]) -> ReceiverAction {
        let Some(start) = self.start_seq else {
            return ReceiverAction::Drop;
        };

        let offset = seq_offset(start, seq);
        if let Some(end) = self.end_seq {
            // Completed: only chunks of the finished transfer get re-acked.
            if offset == 0 || offset >= seq_offset(start, end) {
                log::debug!("[sr:recv] data seq={seq} past completed end={end}; dropped");
                return ReceiverAction::Drop;
            }
            return ReceiverAction::Ack(Packet::ack(self.expected_seq, Some(seq)));
        }

        let expected = seq_offset(start, self.expected_seq);
        if offset == 0 || offset as u64 >= expected as u64 + self.window_size as u64 {
            log::debug!("[sr:recv] data seq={seq} outside window; dropped");
            return ReceiverAction::Drop;
        }

        if self.chunks.insert(offset, payload) {
            log::trace!("[sr:recv] buffered seq={seq} len={}", payload.len());
        }

        let next = self.chunks.first_missing(expected);
        self.expected_seq = start.wrapping_add(next);
        ReceiverAction::Ack(Packet::ack(self.expected_seq, Some(seq)))
    }

    fn on_end(&mut self, seq: u32) -> ReceiverAction {
        let Some(start) = self.start_seq else {
            return ReceiverAction::Drop;
        };
        let ack = Packet::ack(seq.wrapping_add(1), None);

        match self.phase {
            ReceiverPhase::Completed if self.end_seq == Some(seq) => ReceiverAction::Ack(ack),
            ReceiverPhase::Receiving if seq == self.expected_seq => {
                self.phase = ReceiverPhase::Completed;
                self.end_seq = Some(seq);
                let message = self.chunks.assemble();
                log::debug!(
                    "[sr:recv] end seq={seq}; {} chunk(s), {} byte(s) from base {start}",
                    self.chunks.chunk_count(),
                    message.len()
                );
                ReceiverAction::Complete { ack, message }
            }
            _ => {
                log::debug!(
                    "[sr:recv] end seq={seq} with chunks missing below {}; dropped",
                    self.expected_seq
                );
                ReceiverAction::Drop
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack_of(action: &ReceiverAction) -> (u32, Option<u32>) {
        match action {
            ReceiverAction::Ack(ack) | ReceiverAction::Complete { ack, .. } => {
                (ack.seq, ack.selective_ack())
            }
            ReceiverAction::Drop => panic!("expected an ack, got Drop"),
        }
    }

    fn opened(base: u32) -> SrReceiver {
        let mut r = SrReceiver::new(8);
        r.on_packet(&Packet::start(base));
        r
    }

    #[test]
    fn start_acks_first_data_seq() {
        let mut r = SrReceiver::new(4);
        let action = r.on_packet(&Packet::start(1000));
        assert_eq!(ack_of(&action), (1001, None));
        assert_eq!(r.phase(), ReceiverPhase::Receiving);
        assert_eq!(r.expected_seq(), Some(1001));
    }

    #[test]
    fn data_before_start_dropped() {
        let mut r = SrReceiver::new(4);
        assert_eq!(r.on_packet(&Packet::data(1001, b"x".to_vec())), ReceiverAction::Drop);
        assert_eq!(r.on_packet(&Packet::end(1002)), ReceiverAction::Drop);
    }

    #[test]
    fn in_order_data_advances_ack() {
        let mut r = opened(1000);
        assert_eq!(ack_of(&r.on_packet(&Packet::data(1001, b"HELL".to_vec()))), (1002, Some(1001)));
        assert_eq!(ack_of(&r.on_packet(&Packet::data(1002, b"OWOR".to_vec()))), (1003, Some(1002)));
        assert_eq!(ack_of(&r.on_packet(&Packet::data(1003, b"LD".to_vec()))), (1004, Some(1003)));
        match r.on_packet(&Packet::end(1004)) {
            ReceiverAction::Complete { ack, message } => {
                assert_eq!(ack.seq, 1005);
                assert_eq!(message, b"HELLOWORLD");
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn gap_holds_cumulative_ack() {
        let mut r = opened(1000);
        // Chunk 1001 missing: ack stays at the gap but names what arrived.
        assert_eq!(ack_of(&r.on_packet(&Packet::data(1002, b"CD".to_vec()))), (1001, Some(1002)));
        assert_eq!(ack_of(&r.on_packet(&Packet::data(1003, b"EF".to_vec()))), (1001, Some(1003)));
        // Filling the gap jumps over everything already buffered.
        assert_eq!(ack_of(&r.on_packet(&Packet::data(1001, b"AB".to_vec()))), (1004, Some(1001)));
        assert_eq!(r.expected_seq(), Some(1004));
    }

    #[test]
    fn duplicate_data_is_idempotent() {
        let mut r = opened(1000);
        r.on_packet(&Packet::data(1001, b"AB".to_vec()));
        let again = r.on_packet(&Packet::data(1001, b"ZZ".to_vec()));
        assert_eq!(ack_of(&again), (1002, Some(1001)));
        assert_eq!(r.buffered(), 1);
        match r.on_packet(&Packet::end(1002)) {
            ReceiverAction::Complete { message, .. } => assert_eq!(message, b"AB"),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_end_acks_without_redelivery() {
        let mut r = opened(1000);
        r.on_packet(&Packet::data(1001, b"AB".to_vec()));
        assert!(matches!(r.on_packet(&Packet::end(1002)), ReceiverAction::Complete { .. }));
        assert_eq!(r.on_packet(&Packet::end(1002)), ReceiverAction::Ack(Packet::ack(1003, None)));
        assert_eq!(r.phase(), ReceiverPhase::Completed);
    }

    #[test]
    fn end_with_gap_is_dropped() {
        let mut r = opened(1000);
        r.on_packet(&Packet::data(1002, b"CD".to_vec()));
        assert_eq!(r.on_packet(&Packet::end(1003)), ReceiverAction::Drop);
        assert_eq!(r.phase(), ReceiverPhase::Receiving);
    }

    #[test]
    fn duplicate_start_keeps_progress() {
        let mut r = opened(1000);
        r.on_packet(&Packet::data(1001, b"AB".to_vec()));
        assert_eq!(ack_of(&r.on_packet(&Packet::start(1000))), (1001, None));
        assert_eq!(r.expected_seq(), Some(1002));
        assert_eq!(r.buffered(), 1);
    }

    #[test]
    fn foreign_start_during_transfer_dropped() {
        let mut r = opened(1000);
        assert_eq!(r.on_packet(&Packet::start(5000)), ReceiverAction::Drop);
        assert_eq!(r.start_seq(), Some(1000));
    }

    #[test]
    fn new_start_after_completion_resets() {
        let mut r = opened(1000);
        r.on_packet(&Packet::data(1001, b"AB".to_vec()));
        r.on_packet(&Packet::end(1002));
        assert_eq!(ack_of(&r.on_packet(&Packet::start(7000))), (7001, None));
        assert_eq!(r.buffered(), 0);
        assert_eq!(r.phase(), ReceiverPhase::Receiving);
    }

    #[test]
    fn data_beyond_window_dropped() {
        let mut r = SrReceiver::new(2);
        r.on_packet(&Packet::start(1000));
        assert_eq!(r.on_packet(&Packet::data(1003, b"far".to_vec())), ReceiverAction::Drop);
        assert_eq!(ack_of(&r.on_packet(&Packet::data(1002, b"near".to_vec()))), (1001, Some(1002)));
    }

    #[test]
    fn late_data_after_completion_reacked() {
        let mut r = opened(1000);
        r.on_packet(&Packet::data(1001, b"AB".to_vec()));
        r.on_packet(&Packet::end(1002));
        assert_eq!(ack_of(&r.on_packet(&Packet::data(1001, b"AB".to_vec()))), (1002, Some(1001)));
    }

    #[test]
    fn data_past_completed_end_is_neither_acked_nor_buffered() {
        let mut r = SrReceiver::new(8);
        r.on_packet(&Packet::start(1000));
        r.on_packet(&Packet::data(1001, b"A".to_vec()));
        assert!(matches!(r.on_packet(&Packet::end(1002)), ReceiverAction::Complete { .. }));

        assert_eq!(r.on_packet(&Packet::data(1002, b"X".to_vec())), ReceiverAction::Drop);
        assert_eq!(r.on_packet(&Packet::data(1003, b"NEW".to_vec())), ReceiverAction::Drop);
        assert_eq!(r.buffered(), 1);
        assert_eq!(r.phase(), ReceiverPhase::Completed);
    }

    #[test]
    fn acks_are_ignored() {
        let mut r = opened(1000);
        assert_eq!(r.on_packet(&Packet::ack(1001, None)), ReceiverAction::Drop);
    }

    #[test]
    fn wrap_around_transfer() {
        let base = u32::MAX - 1;
        let mut r = opened(base);
        r.on_packet(&Packet::data(0, b"CD".to_vec()));
        r.on_packet(&Packet::data(u32::MAX, b"AB".to_vec()));
        match r.on_packet(&Packet::end(1)) {
            ReceiverAction::Complete { ack, message } => {
                assert_eq!(ack.seq, 2);
                assert_eq!(message, b"ABCD");
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn empty_message_completes_immediately() {
        let mut r = opened(1000);
        match r.on_packet(&Packet::end(1001)) {
            ReceiverAction::Complete { message, .. } => assert!(message.is_empty()),
            other => panic!("expected completion, got {other:?}"),
        }
    }
}
