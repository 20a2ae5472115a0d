//! Outer datagram framing.
//!
//! A UDP socket may carry several transfers at once, in both directions.
//! Each datagram is therefore wrapped in a [`Frame`] naming the direction it
//! travels ([`Role`]) and the transfer it belongs to.  The protocol state
//! machines never see frames; [`crate::socket`] adds and strips them.
//!
//! ```text
//! +--------+----------------------------+------------------------+
//! |  Role  |   Transfer ID (u32, BE)    |   Packet bytes ...     |
//! +--------+----------------------------+------------------------+
//! ```

use thiserror::Error;

/// Byte length of the frame header.
pub const FRAME_HEADER_LEN: usize = 5;

/// Direction a datagram travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sender → receiver: `start`, `data`, `end`.
    Sender,
    /// Receiver → sender: `ack`.
    Receiver,
}

impl Role {
    fn tag(self) -> u8 {
        match self {
            Role::Sender => b's',
            Role::Receiver => b'r',
        }
    }

    /// The role of the endpoint on the other side.
    pub fn peer(self) -> Role {
        match self {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub role: Role,
    pub transfer_id: u32,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + self.body.len());
        buf.push(self.role.tag());
        buf.extend_from_slice(&self.transfer_id.to_be_bytes());
        buf.extend_from_slice(&self.body);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < FRAME_HEADER_LEN {
            return Err(FrameError::TooShort);
        }
        let role = match buf[0] {
            b's' => Role::Sender,
            b'r' => Role::Receiver,
            other => return Err(FrameError::UnknownRole(other)),
        };
        let transfer_id = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        Ok(Frame {
            role,
            transfer_id,
            body: buf[FRAME_HEADER_LEN..].to_vec(),
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("datagram shorter than the frame header")]
    TooShort,
    #[error("unknown role tag {0:#04x}")]
    UnknownRole(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout() {
        let frame = Frame { role: Role::Sender, transfer_id: 0x0a0b_0c0d, body: vec![1, 2, 3] };
        let bytes = frame.encode();
        assert_eq!(bytes, vec![b's', 0x0a, 0x0b, 0x0c, 0x0d, 1, 2, 3]);
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn empty_body_is_allowed() {
        let frame = Frame { role: Role::Receiver, transfer_id: 7, body: vec![] };
        assert_eq!(Frame::decode(&frame.encode()).unwrap(), frame);
    }

    #[test]
    fn short_datagram_rejected() {
        assert_eq!(Frame::decode(&[b's', 0, 0]), Err(FrameError::TooShort));
    }

    #[test]
    fn unknown_role_rejected() {
        assert_eq!(Frame::decode(&[b'x', 0, 0, 0, 1]), Err(FrameError::UnknownRole(b'x')));
    }

    #[test]
    fn peer_role_flips() {
        assert_eq!(Role::Sender.peer(), Role::Receiver);
        assert_eq!(Role::Receiver.peer(), Role::Sender);
    }
}
