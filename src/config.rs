//! Transport configuration.
//!
//! Both ends of a transfer read the same [`TransportConfig`].  The binary
//! fills one in from command-line flags; library users start from
//! [`TransportConfig::default`] and override fields.

use std::time::Duration;

use thiserror::Error;

use crate::frame::FRAME_HEADER_LEN;
use crate::packet::{HEADER_LEN, MAX_PAYLOAD};

/// Lowest base sequence number a sender will pick by default.
pub const DEFAULT_BASE_SEQ_MIN: u32 = 1000;
/// Width of the default base sequence range (`1000 .. 10000`).
pub const DEFAULT_BASE_SEQ_SPAN: u32 = 9000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Maximum payload bytes per `data` packet.
    pub chunk_size: usize,
    /// Maximum number of `data` packets in flight at once.
    pub window_size: usize,
    /// How long the sender waits for progress before retransmitting.
    pub retransmission_timeout: Duration,
    /// Largest datagram the channel will accept.
    pub receive_buffer_size: usize,
    /// Lower bound of the random base sequence range.
    pub base_seq_min: u32,
    /// Number of distinct base sequence numbers to choose from.
    pub base_seq_span: u32,
    /// How long a server keeps a silent transfer before evicting it.  Must
    /// cover the sender's retransmissions of a final `end`.
    pub transfer_linger: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            window_size: 8,
            retransmission_timeout: Duration::from_millis(500),
            receive_buffer_size: 4096,
            base_seq_min: DEFAULT_BASE_SEQ_MIN,
            base_seq_span: DEFAULT_BASE_SEQ_SPAN,
            transfer_linger: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Largest datagram this configuration can put on the wire.
    pub fn max_datagram_len(&self) -> usize {
        FRAME_HEADER_LEN + HEADER_LEN + self.chunk_size
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.chunk_size > MAX_PAYLOAD {
            return Err(ConfigError::ChunkTooLarge { chunk_size: self.chunk_size, max: MAX_PAYLOAD });
        }
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.retransmission_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.base_seq_span == 0 {
            return Err(ConfigError::EmptyBaseSeqRange);
        }
        if self.transfer_linger.is_zero() {
            return Err(ConfigError::ZeroLinger);
        }
        if self.max_datagram_len() > self.receive_buffer_size {
            return Err(ConfigError::BufferTooSmall {
                needed: self.max_datagram_len(),
                receive_buffer_size: self.receive_buffer_size,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chunk_size must be at least 1")]
    ZeroChunkSize,
    #[error("chunk_size {chunk_size} exceeds the maximum payload of {max} bytes")]
    ChunkTooLarge { chunk_size: usize, max: usize },
    #[error("window_size must be at least 1")]
    ZeroWindow,
    #[error("retransmission_timeout must be non-zero")]
    ZeroTimeout,
    #[error("base_seq_span must be at least 1")]
    EmptyBaseSeqRange,
    #[error("transfer_linger must be non-zero")]
    ZeroLinger,
    #[error("a full data datagram needs {needed} bytes but receive_buffer_size is {receive_buffer_size}")]
    BufferTooSmall { needed: usize, receive_buffer_size: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(TransportConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let cfg = TransportConfig { chunk_size: 0, ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroChunkSize));
    }

    #[test]
    fn zero_window_rejected() {
        let cfg = TransportConfig { window_size: 0, ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroWindow));
    }

    #[test]
    fn zero_timeout_rejected() {
        let cfg = TransportConfig { retransmission_timeout: Duration::ZERO, ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn chunk_must_fit_receive_buffer() {
        let cfg = TransportConfig { chunk_size: 4096, receive_buffer_size: 4096, ..Default::default() };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::BufferTooSmall { needed: 4096 + 14, receive_buffer_size: 4096 })
        );
    }

    #[test]
    fn chunk_bounded_by_codec() {
        let cfg = TransportConfig {
            chunk_size: MAX_PAYLOAD + 1,
            receive_buffer_size: usize::MAX,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ChunkTooLarge { .. })));
    }

    #[test]
    fn empty_base_range_rejected() {
        let cfg = TransportConfig { base_seq_span: 0, ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyBaseSeqRange));
    }

    #[test]
    fn zero_linger_rejected() {
        let cfg = TransportConfig { transfer_linger: Duration::ZERO, ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroLinger));
    }
}
