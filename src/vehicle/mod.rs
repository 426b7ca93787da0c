//! The vehicle physics/state model: ignition and engine state machines,
//! sensor simulation, readiness monitors, and profile configuration.

pub mod ignition;
pub mod profile;
pub mod readiness;
pub mod simulator;
pub mod snapshot;

pub use ignition::{EngineState, IgnitionState};
pub use profile::VehicleProfile;
pub use readiness::{Monitor, MonitorState, ReadinessSet};
pub use simulator::{DtcTrigger, DtcTriggerEvent, ParamOverrides, VehicleSimulator};
pub use snapshot::Snapshot;
