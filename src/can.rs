//! CAN frame I/O.
//!
//! The simulator never touches real hardware: a [`CanTransceiver`] is any
//! duplex sink/source of [`CanFrame`]s, whether that's a virtual bus, an
//! in-process `mpsc` pair, or a test mock. Extended (29-bit) IDs are out of
//! scope; arbitration IDs are always the standard 11-bit range.

use thiserror::Error;

/// Maximum data length of a classic CAN frame.
pub const MAX_DATA_LEN: usize = 8;

/// Byte used to pad short frames and unused trailing bytes.
pub const PAD_BYTE: u8 = 0x00;

/// A single classic CAN frame: an 11-bit arbitration ID and 0-8 data bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    id: u16,
    data: Vec<u8>,
}

impl CanFrame {
    /// Builds a frame from an arbitration ID and unpadded data.
    ///
    /// ## Panics
    /// Panics if `id` exceeds the 11-bit range or `data` is longer than
    /// [`MAX_DATA_LEN`] -- both are programmer errors, not runtime conditions.
    pub fn new(id: u16, data: &[u8]) -> Self {
        assert!(id <= 0x7FF, "CAN arbitration ID 0x{id:03X} exceeds 11 bits");
        assert!(
            data.len() <= MAX_DATA_LEN,
            "CAN frame data length {} exceeds {MAX_DATA_LEN}",
            data.len()
        );
        Self {
            id,
            data: data.to_vec(),
        }
    }

    /// Builds a frame, padding `data` out to 8 bytes with [`PAD_BYTE`].
    pub fn new_padded(id: u16, data: &[u8]) -> Self {
        let mut buf = data.to_vec();
        buf.resize(MAX_DATA_LEN, PAD_BYTE);
        Self { id, data: buf }
    }

    /// The 11-bit arbitration ID.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// The frame's data bytes (0-8 of them; may include trailing padding).
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Error produced by a CAN transceiver implementation.
#[derive(Debug, Error)]
pub enum CanError {
    /// The transceiver's send side is closed (e.g. the peer task has exited).
    #[error("CAN transceiver is closed")]
    Closed,
    /// No frame was available within the requested window.
    #[error("CAN transceiver timed out waiting for a frame")]
    Timeout,
}

/// Bidirectional channel carrying CAN frames. Implementations are expected
/// to be cheap to clone (an `mpsc::Sender` handle, typically) since every
/// ECU actor and the bus coordinator each hold their own handle.
pub trait CanTransceiver: Send {
    /// Sends a single frame onto the bus. Non-blocking from the caller's
    /// perspective: arbitration and physical-layer timing are not modeled.
    fn send(&self, frame: CanFrame) -> Result<(), CanError>;

    /// Attempts to receive the next frame within `timeout`. Returns
    /// [`CanError::Timeout`] if nothing arrived.
    fn recv_timeout(&self, timeout: std::time::Duration) -> Result<CanFrame, CanError>;
}
