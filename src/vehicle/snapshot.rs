//! The read-consistent value type handlers observe.

/// A point-in-time copy of every sensor-backed field the OBD-II and UDS
/// handlers read. Taken under the simulator's mutex and then released --
/// no handler holds the lock across its own response send.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    /// Engine speed, rpm, 0..=16383.
    pub rpm: u16,
    /// Vehicle speed, km/h, 0..=255.
    pub speed: u8,
    /// Calculated engine load, %, 0..=100.
    pub engine_load: u8,
    /// Coolant temperature, °C, -40..=215.
    pub coolant_temp: i16,
    /// Intake air temperature, °C, -40..=215.
    pub intake_temp: i16,
    /// Mass air flow, g/s, 0..=655.35.
    pub maf: f32,
    /// Throttle position, %, 0..=100.
    pub throttle: u8,
    /// Fuel level, %, 0..=100.
    pub fuel_level: u8,
    /// Battery/system voltage, V, 0..=65.535.
    pub battery_v: f32,
    /// Engine runtime since start, s, 0..=65535.
    pub runtime_s: u16,
    /// Distance travelled with the MIL on, km, 0..=65535.
    pub distance_mil_on: u16,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            rpm: 0,
            speed: 0,
            engine_load: 0,
            coolant_temp: -20,
            intake_temp: 20,
            maf: 0.0,
            throttle: 0,
            fuel_level: 50,
            battery_v: 12.6,
            runtime_s: 0,
            distance_mil_on: 0,
        }
    }
}
