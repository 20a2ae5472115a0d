//! Window bookkeeping for both directions.
//!
//! - [`SendWindow`] holds the packets a sender has transmitted but not yet
//!   seen acknowledged.  The sender inserts on first transmission and
//!   removes on acknowledgment; nothing else touches it.
//! - [`ReassemblyBuffer`] holds chunk payloads on the receiving side, keyed
//!   by offset from the transfer's base.  The receiver inserts on first
//!   arrival and never removes.
//!
//! Both are ordered maps: the sender retransmits oldest-first and the
//! receiver needs the ascending scan for gap detection and reassembly.

use std::collections::BTreeMap;

use crate::seq::seq_offset;

/// Sent-but-unacknowledged packets, bounded by the window size.
#[derive(Debug)]
pub struct SendWindow {
    base_seq: u32,
    capacity: usize,
    // Encoded packets keyed by offset from `base_seq`, so ordering holds
    // across wrap-around.
    slots: BTreeMap<u32, Vec<u8>>,
}

impl SendWindow {
    pub fn new(base_seq: u32, capacity: usize) -> Self {
        assert!(capacity >= 1, "window capacity must be at least 1");
        Self {
            base_seq,
            capacity,
            slots: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.slots.contains_key(&seq_offset(self.base_seq, seq))
    }

    /// Record the first transmission of `seq`.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the window is already full.
    pub fn insert(&mut self, seq: u32, bytes: Vec<u8>) {
        debug_assert!(
            !self.is_full(),
            "insert called on a full send window ({} / {})",
            self.slots.len(),
            self.capacity
        );
        self.slots.insert(seq_offset(self.base_seq, seq), bytes);
    }

    /// Drop `seq` from the window.  Returns `true` if it was in flight.
    pub fn remove(&mut self, seq: u32) -> bool {
        self.slots.remove(&seq_offset(self.base_seq, seq)).is_some()
    }

    /// Every in-flight packet, oldest first.
    pub fn pending(&self) -> Vec<Vec<u8>> {
        self.slots.values().cloned().collect()
    }
}

/// Out-of-order chunk store on the receiving side.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    chunks: BTreeMap<u32, Vec<u8>>,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `payload` at `offset` unless something is already there.
    /// Returns `true` when the chunk was new.
    pub fn insert(&mut self, offset: u32, payload: &[u8]) -> bool {
        use std::collections::btree_map::Entry;

        match self.chunks.entry(offset) {
            Entry::Vacant(slot) => {
                slot.insert(payload.to_vec());
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Number of distinct chunks stored.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// First offset at or above `from` that has not arrived yet.
    pub fn first_missing(&self, from: u32) -> u32 {
        let mut next = from;
        for &offset in self.chunks.range(from..).map(|(k, _)| k) {
            if offset != next {
                break;
            }
            next += 1;
        }
        next
    }

    /// Concatenate every stored chunk in ascending offset order.
    pub fn assemble(&self) -> Vec<u8> {
        let len = self.chunks.values().map(Vec::len).sum();
        let mut message = Vec::with_capacity(len);
        for chunk in self.chunks.values() {
            message.extend_from_slice(chunk);
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_window_tracks_capacity() {
        let mut w = SendWindow::new(100, 2);
        assert!(w.is_empty());
        w.insert(101, vec![1]);
        assert!(!w.is_full());
        w.insert(102, vec![2]);
        assert!(w.is_full());
        assert_eq!(w.len(), 2);
        assert!(w.contains(101));
        assert!(!w.contains(103));
    }

    #[test]
    fn remove_is_idempotent() {
        let mut w = SendWindow::new(100, 4);
        w.insert(101, vec![1]);
        assert!(w.remove(101));
        assert!(!w.remove(101));
        assert!(w.is_empty());
    }

    #[test]
    fn pending_is_oldest_first_across_wrap() {
        let base = u32::MAX - 1;
        let mut w = SendWindow::new(base, 4);
        w.insert(1, vec![3]);
        w.insert(u32::MAX, vec![1]);
        w.insert(0, vec![2]);
        assert_eq!(w.pending(), vec![vec![1], vec![2], vec![3]]);
        assert!(w.remove(0));
        assert_eq!(w.pending(), vec![vec![1], vec![3]]);
    }

    #[test]
    fn reassembly_first_arrival_wins() {
        let mut r = ReassemblyBuffer::new();
        assert!(r.insert(1, b"AB"));
        assert!(!r.insert(1, b"XX"));
        assert_eq!(r.assemble(), b"AB");
    }

    #[test]
    fn first_missing_stops_at_gap() {
        let mut r = ReassemblyBuffer::new();
        assert_eq!(r.first_missing(1), 1);
        r.insert(2, b"b");
        r.insert(3, b"c");
        assert_eq!(r.first_missing(1), 1);
        r.insert(1, b"a");
        assert_eq!(r.first_missing(1), 4);
        r.insert(5, b"e");
        assert_eq!(r.first_missing(1), 4);
        assert_eq!(r.first_missing(5), 6);
    }

    #[test]
    fn assemble_orders_by_offset() {
        let mut r = ReassemblyBuffer::new();
        r.insert(3, b"LD");
        r.insert(1, b"HELL");
        r.insert(2, b"OWOR");
        assert_eq!(r.assemble(), b"HELLOWORLD");
        assert_eq!(r.chunk_count(), 3);
    }
}
