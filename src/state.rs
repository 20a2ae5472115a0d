//! Transfer phase types.
//!
//! Each state machine walks through a short, linear set of phases.  The
//! transitions themselves live in [`crate::sender`] and [`crate::receiver`];
//! keeping the types here lets the drivers and logs name phases without
//! reaching into either machine.

/// Phases of one outbound transfer.
///
/// ```text
///  IDLE ──start sent──▶ OPENING ──start acked──▶ TRANSFERRING
///                                                    │
///                                    all chunks acked│
///                                                    ▼
///                          DONE ◀──end acked── CLOSING
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderPhase {
    /// Nothing sent yet.
    #[default]
    Idle,
    /// `start` sent; waiting for its acknowledgment.
    Opening,
    /// Pipelining `data` packets through the window.
    Transferring,
    /// `end` sent; waiting for its acknowledgment.
    Closing,
    /// The `end` handshake completed.
    Done,
}

/// Phases of one inbound transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverPhase {
    /// No `start` seen yet; `data` and `end` are dropped.
    #[default]
    AwaitingStart,
    /// Buffering chunks and acknowledging progress.
    Receiving,
    /// The message was delivered; only re-acknowledgments remain.
    Completed,
}

impl std::fmt::Display for SenderPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::fmt::Display for ReceiverPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
