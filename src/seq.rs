//! Sequence-number helpers shared by both state machines.
//!
//! A transfer's sequence space is laid out relative to its randomly chosen
//! base:
//!
//! ```text
//!  base        base+1 ... base+N        base+N+1
//!    │            │          │              │
//!  start       chunk 0 .. chunk N-1        end
//! ```
//!
//! Sequence numbers are u32 and wrap; everything here works on offsets from
//! the base so a transfer straddling `u32::MAX` behaves like any other.

use rand::Rng;

/// Distance of `seq` from `base`, i.e. `0` for the start packet and
/// `i + 1` for chunk `i`.
#[inline]
pub fn seq_offset(base: u32, seq: u32) -> u32 {
    seq.wrapping_sub(base)
}

/// Sequence number of chunk `index` in a transfer opened at `base`.
#[inline]
pub fn chunk_seq(base: u32, index: usize) -> u32 {
    base.wrapping_add(1).wrapping_add(index as u32)
}

/// Number of sequence numbers a transfer of `chunks` chunks occupies on the
/// wire: `start` through the ack of `end`, i.e. `base ..= base + chunks + 2`.
#[inline]
pub fn transfer_span(chunks: usize) -> u64 {
    chunks as u64 + 3
}

/// `true` when the wrap-around ranges `[a, a + a_len)` and `[b, b + b_len)`
/// share a sequence number.
pub fn ranges_overlap(a: u32, a_len: u64, b: u32, b_len: u64) -> bool {
    u64::from(seq_offset(a, b)) < a_len || u64::from(seq_offset(b, a)) < b_len
}

/// Split `message` into ordered chunks of at most `chunk_size` bytes.
///
/// An empty message produces no chunks.
pub fn chunk_message(message: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    assert!(chunk_size >= 1, "chunk_size must be at least 1");
    message.chunks(chunk_size).map(<[u8]>::to_vec).collect()
}

/// Pick a base sequence number uniformly from `min .. min + span`.
///
/// The range wraps past `u32::MAX` instead of saturating.
pub fn choose_base_seq<R: Rng + ?Sized>(rng: &mut R, min: u32, span: u32) -> u32 {
    assert!(span >= 1, "base sequence span must be at least 1");
    min.wrapping_add(rng.random_range(0..span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn helloworld_splits_into_three_chunks() {
        let chunks = chunk_message(b"HELLOWORLD", 4);
        assert_eq!(chunks, vec![b"HELL".to_vec(), b"OWOR".to_vec(), b"LD".to_vec()]);
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        let chunks = chunk_message(b"ABCD", 2);
        assert_eq!(chunks, vec![b"AB".to_vec(), b"CD".to_vec()]);
    }

    #[test]
    fn empty_message_has_no_chunks() {
        assert!(chunk_message(b"", 4).is_empty());
    }

    #[test]
    fn chunk_sequence_numbers_follow_base() {
        assert_eq!(chunk_seq(1000, 0), 1001);
        assert_eq!(chunk_seq(1000, 2), 1003);
        assert_eq!(seq_offset(1000, 1003), 3);
    }

    #[test]
    fn offsets_survive_wrap_around() {
        let base = u32::MAX - 1;
        assert_eq!(chunk_seq(base, 0), u32::MAX);
        assert_eq!(chunk_seq(base, 1), 0);
        assert_eq!(seq_offset(base, 0), 2);
    }

    #[test]
    fn overlapping_ranges_detected() {
        // 10 chunks at 1000 occupy 1000 ..= 1012.
        let span = transfer_span(10);
        assert!(ranges_overlap(1000, span, 1001, span));
        assert!(ranges_overlap(1000, span, 1012, span));
        assert!(ranges_overlap(1012, span, 1000, span));
        assert!(ranges_overlap(990, span, 1000, span));
        assert!(!ranges_overlap(1000, span, 1013, span));
        assert!(!ranges_overlap(987, span, 1000, span));
    }

    #[test]
    fn overlap_holds_across_wrap() {
        let span = transfer_span(4);
        assert!(ranges_overlap(u32::MAX - 2, span, 1, span));
        assert!(!ranges_overlap(u32::MAX - 2, span, 4, span));
    }

    #[test]
    fn base_seq_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let base = choose_base_seq(&mut rng, 1000, 9000);
            assert!((1000..10_000).contains(&base));
        }
    }

    #[test]
    fn base_seq_span_of_one_is_fixed() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(choose_base_seq(&mut rng, 42, 1), 42);
    }
}
