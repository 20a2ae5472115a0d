//! Wire-format definitions for protocol packets.
//!
//! Every datagram body exchanged between a sender and a receiver is a
//! [`Packet`].  This module is responsible for:
//! - Defining the on-wire binary layout (type, sequence number, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], rejecting
//!   truncated input and anything whose checksum does not verify.
//!
//! No I/O happens here.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |               Sequence Number                 |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |               |        Payload Length         |   Checksum    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |               |            Payload ...                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 9 bytes.
//! type(1) + seq(4) + payload_len(2) + checksum(2)
//!
//! # Acknowledgments
//!
//! An `ack` packet's sequence number is cumulative: "every sequence number
//! below this one has arrived".  When the ack answers a `data` packet its
//! payload holds that packet's sequence number (4 bytes), so the sender can
//! free the exact slot even while the cumulative number is held back by a gap.

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 9;

/// Largest payload the `payload_len` field can describe.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

// Byte offsets of each field within the serialised header.
const OFF_TYPE: usize = 0;
const OFF_SEQ: usize = 1;
const OFF_PAYLOAD_LEN: usize = 5;
const OFF_CHECKSUM: usize = 7;

const SELECTIVE_ACK_LEN: usize = 4;

/// The four packet kinds of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Opens a transfer at the base sequence number.
    Start,
    /// Carries one chunk of the message.
    Data,
    /// Closes a transfer once every chunk is acknowledged.
    End,
    /// Acknowledgment from the receiver.
    Ack,
}

impl PacketType {
    fn to_byte(self) -> u8 {
        match self {
            PacketType::Start => 0,
            PacketType::Data => 1,
            PacketType::End => 2,
            PacketType::Ack => 3,
        }
    }

    fn from_byte(b: u8) -> Result<Self, PacketError> {
        match b {
            0 => Ok(PacketType::Start),
            1 => Ok(PacketType::Data),
            2 => Ok(PacketType::End),
            3 => Ok(PacketType::Ack),
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PacketType::Start => "start",
            PacketType::Data => "data",
            PacketType::End => "end",
            PacketType::Ack => "ack",
        };
        f.write_str(s)
    }
}

/// A complete protocol packet: type, sequence number and payload bytes.
///
/// The checksum is not stored; [`Packet::encode`] computes it and
/// [`Packet::decode`] verifies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub seq: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn start(seq: u32) -> Self {
        Self { kind: PacketType::Start, seq, payload: Vec::new() }
    }

    pub fn data(seq: u32, payload: Vec<u8>) -> Self {
        Self { kind: PacketType::Data, seq, payload }
    }

    pub fn end(seq: u32) -> Self {
        Self { kind: PacketType::End, seq, payload: Vec::new() }
    }

    /// Build an acknowledgment.  `cumulative` is the next sequence number the
    /// receiver is waiting for; `selective` names the data packet being
    /// answered, if any.
    pub fn ack(cumulative: u32, selective: Option<u32>) -> Self {
        let payload = selective.map(|s| s.to_be_bytes().to_vec()).unwrap_or_default();
        Self { kind: PacketType::Ack, seq: cumulative, payload }
    }

    /// The selectively acknowledged sequence number carried by a data ack.
    pub fn selective_ack(&self) -> Option<u32> {
        if self.kind != PacketType::Ack {
            return None;
        }
        let bytes: [u8; SELECTIVE_ACK_LEN] = self.payload.as_slice().try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// The payload must not exceed [`MAX_PAYLOAD`]; configuration validation
    /// keeps chunk sizes below that.
    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(self.payload.len() <= MAX_PAYLOAD, "payload too large to encode");
        let payload_len = self.payload.len();
        let mut buf = vec![0u8; HEADER_LEN + payload_len];

        buf[OFF_TYPE] = self.kind.to_byte();
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 2]
            .copy_from_slice(&(payload_len as u16).to_be_bytes());
        // Checksum field stays zero while computing the checksum.
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        let csum = internet_checksum(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());

        buf
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`],
    /// - the `payload_len` field disagrees with `buf.len()`,
    /// - the checksum does not verify, or
    /// - the type byte is not a known [`PacketType`].
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort);
        }

        let payload_len = u16::from_be_bytes([buf[OFF_PAYLOAD_LEN], buf[OFF_PAYLOAD_LEN + 1]]);
        if buf.len() != HEADER_LEN + payload_len as usize {
            return Err(PacketError::LengthMismatch);
        }

        let checksum = u16::from_be_bytes([buf[OFF_CHECKSUM], buf[OFF_CHECKSUM + 1]]);
        let mut scratch = buf.to_vec();
        scratch[OFF_CHECKSUM..OFF_CHECKSUM + 2].fill(0);
        if internet_checksum(&scratch) != checksum {
            return Err(PacketError::ChecksumFailed);
        }

        let kind = PacketType::from_byte(buf[OFF_TYPE])?;
        let seq = u32::from_be_bytes([
            buf[OFF_SEQ],
            buf[OFF_SEQ + 1],
            buf[OFF_SEQ + 2],
            buf[OFF_SEQ + 3],
        ]);

        Ok(Packet {
            kind,
            seq,
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Errors that can arise when parsing a raw packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("buffer too short to contain a header")]
    BufferTooShort,
    #[error("payload_len field does not match remaining bytes")]
    LengthMismatch,
    #[error("checksum verification failed")]
    ChecksumFailed,
    #[error("unknown packet type {0}")]
    UnknownType(u8),
}

/// Compute the Internet checksum (RFC 1071) over `data`.
///
/// Sum consecutive 16-bit big-endian words, fold the carry, return the
/// one's-complement.  The caller must zero any checksum field within `data`
/// before calling this function.
fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);

    for w in words.by_ref() {
        sum += u32::from(u16::from_be_bytes([w[0], w[1]]));
    }
    // Odd trailing byte: pad with a zero byte on the right.
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}
