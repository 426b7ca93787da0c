//! ISO-TP (ISO 15765-2) transport engine: segmentation and reassembly of
//! payloads up to 4095 bytes over 8-byte CAN frames, including the flow
//! control handshake. See [`IsoTpSession`].

pub mod constants;
mod error;
mod session;

pub use error::IsoTpError;
pub use session::{IsoTpEvent, IsoTpSession, PENDING_QUEUE_DEPTH};
