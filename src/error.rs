//! Crate-wide error taxonomy.
//!
//! Protocol-level outcomes that a real scan tool is meant to observe (ISO-TP
//! timeouts, UDS negative responses) are *not* represented here as `Err` --
//! they are valid values flowing back over the bus. [`SimError`] is reserved
//! for the remaining three buckets from the design: resource-limit errors,
//! control-surface errors, and wrapped lower-layer errors.

use thiserror::Error;

use crate::can::CanError;
use crate::isotp::IsoTpError;

/// Result type used throughout the control-surface API.
pub type SimResult<T> = Result<T, SimError>;

/// Errors surfaced to callers of the simulator's control surface.
#[derive(Debug, Error)]
pub enum SimError {
    /// No ECU with this logical name is registered on the bus.
    #[error("no ECU named '{0}' on this bus")]
    EcuNotFound(String),

    /// A DTC code string was not a valid 5-character canonical code (e.g. `P0420`).
    #[error("'{0}' is not a valid DTC code")]
    CodeInvalid(String),

    /// The requested operation's preconditions were not met (e.g. actuator
    /// control requiring KOEO while the engine is running).
    #[error("condition not met: {0}")]
    ConditionNotMet(String),

    /// The vehicle profile failed validation on load.
    #[error("invalid vehicle profile: {0}")]
    InvalidProfile(String),

    /// A resource limit was hit (e.g. the pending-request queue is full).
    #[error("resource limit exceeded: {0}")]
    ResourceExhausted(String),

    /// Lower-layer CAN I/O error.
    #[error("CAN error: {0}")]
    Can(#[from] CanError),

    /// Lower-layer ISO-TP error.
    #[error("ISO-TP error: {0}")]
    IsoTp(#[from] IsoTpError),
}
