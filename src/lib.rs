#![warn(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]

//! A deterministic simulator of an automotive diagnostic network as seen
//! from the OBD connector: multiple ECUs hanging off a shared virtual CAN
//! bus, each answering legacy OBD-II requests and UDS (ISO 14229) requests
//! transported over ISO-TP (ISO 15765-2).
//!
//! ## Layout
//!
//! * [`can`] -- the CAN frame type and the transceiver trait every bus
//!   implementation satisfies.
//! * [`isotp`] -- segmentation, reassembly and flow control for one
//!   address pair.
//! * [`bus`] -- the in-process virtual bus and the coordinator that
//!   demultiplexes frames to the ECU whose request ID matches.
//! * [`dtc`] -- the diagnostic trouble code lifecycle state machine.
//! * [`vehicle`] -- the shared physics/state model: ignition, sensors,
//!   readiness monitors, and profile loading.
//! * [`obd2`] -- legacy OBD-II mode handlers (`0x01..=0x0A`).
//! * [`uds`] -- UDS service handlers (`0x10..=0x85`).
//! * [`control`] -- [`control::Simulator`], the top-level object that wires
//!   everything together and exposes the synchronous control-surface API.
//!
//! This crate never touches real hardware and never initializes a logger;
//! it emits `log` records at module boundaries for a host binary or test to
//! capture.

pub mod bus;
pub mod can;
pub mod control;
pub mod dtc;
mod ecu;
pub mod error;
pub mod isotp;
pub mod obd2;
pub mod uds;
pub mod vehicle;

pub use control::{ActuatorOption, EcuSpec, Simulator};
pub use error::{SimError, SimResult};
