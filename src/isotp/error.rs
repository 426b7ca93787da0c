//! ISO-TP level errors.

use thiserror::Error;

/// Errors that can abort an in-progress ISO-TP transfer.
///
/// These are recovered locally within the session (the buffer is discarded,
/// the error is logged) rather than propagated to the peer -- a client that
/// hits one of these will simply see its own request or response time out,
/// matching the "framing errors never get a response" policy from the
/// design notes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IsoTpError {
    /// The PCI nibble did not match any known frame type.
    #[error("unrecognized PCI nibble 0x{0:X}")]
    BadPci(u8),
    /// A Single Frame declared a length of 0, which is invalid.
    #[error("single frame declared zero length")]
    ZeroLengthSingleFrame,
    /// A Consecutive Frame arrived with a sequence number that didn't match
    /// the expected one.
    #[error("sequence mismatch: expected {expected}, got {got}")]
    SequenceMismatch {
        /// Sequence number the receiver expected.
        expected: u8,
        /// Sequence number that actually arrived.
        got: u8,
    },
    /// A payload outside `1..=4095` bytes was given to [`crate::isotp::IsoTpSession::send`].
    #[error("payload length {0} outside 1..=4095")]
    PayloadLengthInvalid(usize),
    /// The sender gave up waiting for a Flow Control frame (N_Bs expired).
    #[error("timed out waiting for flow control")]
    FlowControlTimeout,
    /// The receiver gave up waiting for the next Consecutive Frame (N_Cr expired).
    #[error("timed out waiting for consecutive frame")]
    ConsecutiveFrameTimeout,
    /// The peer sent FC=OVERFLOW.
    #[error("peer reported overflow")]
    Overflow,
    /// The peer sent FC=WAIT too many times in a row.
    #[error("exceeded maximum consecutive flow-control waits")]
    TooManyWaits,
    /// The underlying CAN transceiver failed.
    #[error("CAN transceiver error: {0}")]
    Can(#[from] crate::can::CanError),
}
