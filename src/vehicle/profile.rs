//! Vehicle profile configuration, loaded from JSON.

use serde::Deserialize;

use crate::error::{SimError, SimResult};

/// Top-level vehicle identity block.
#[derive(Debug, Clone, Deserialize)]
pub struct VehicleInfo {
    pub vin: String,
    pub make: String,
    pub model: String,
    pub year: u16,
}

/// Tunable sensor constants that seed the simulator's physics model.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorProfile {
    #[serde(default = "default_rpm_idle")]
    pub rpm_idle: u16,
    #[serde(default = "default_rpm_max")]
    pub rpm_max: u16,
    #[serde(default = "default_coolant_normal")]
    pub coolant_temp_normal: i16,
    #[serde(default = "default_fuel_capacity")]
    pub fuel_capacity: f32,
}

fn default_rpm_idle() -> u16 {
    750
}
fn default_rpm_max() -> u16 {
    6500
}
fn default_coolant_normal() -> i16 {
    90
}
fn default_fuel_capacity() -> f32 {
    55.0
}

impl Default for SensorProfile {
    fn default() -> Self {
        Self {
            rpm_idle: default_rpm_idle(),
            rpm_max: default_rpm_max(),
            coolant_temp_normal: default_coolant_normal(),
            fuel_capacity: default_fuel_capacity(),
        }
    }
}

/// A DTC the profile seeds into the trigger table: on each tick it fires
/// with probability `probability` (0.0..=1.0) once its preconditions are
/// otherwise met.
#[derive(Debug, Clone, Deserialize)]
pub struct DtcSeed {
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub mil_illuminate: bool,
    #[serde(default)]
    pub probability: f32,
}

/// A complete vehicle profile as loaded from JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct VehicleProfile {
    pub vehicle: VehicleInfo,
    #[serde(default)]
    pub sensors: SensorProfile,
    #[serde(default)]
    pub dtcs: Vec<DtcSeed>,
}

impl VehicleProfile {
    /// Parses and validates a profile from its JSON source text.
    pub fn from_json(text: &str) -> SimResult<Self> {
        let profile: VehicleProfile = serde_json::from_str(text)
            .map_err(|e| SimError::InvalidProfile(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    fn validate(&self) -> SimResult<()> {
        if self.vehicle.vin.len() != 17 {
            return Err(SimError::InvalidProfile(format!(
                "vin '{}' must be exactly 17 characters",
                self.vehicle.vin
            )));
        }
        if self.sensors.rpm_idle >= self.sensors.rpm_max {
            return Err(SimError::InvalidProfile(
                "sensors.rpm_idle must be less than sensors.rpm_max".to_string(),
            ));
        }
        if self.sensors.rpm_max > 16383 {
            return Err(SimError::InvalidProfile(
                "sensors.rpm_max exceeds the 16383 rpm wire range".to_string(),
            ));
        }
        if !(-40..=215).contains(&self.sensors.coolant_temp_normal) {
            return Err(SimError::InvalidProfile(
                "sensors.coolant_temp_normal outside -40..=215".to_string(),
            ));
        }
        for dtc in &self.dtcs {
            crate::dtc::DtcCode::parse(&dtc.code)?;
            if !(0.0..=1.0).contains(&dtc.probability) {
                return Err(SimError::InvalidProfile(format!(
                    "dtcs[].probability for '{}' must be within 0.0..=1.0",
                    dtc.code
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_profile() {
        let json = r#"{
            "vehicle": {"vin": "1HGCM82633A004352", "make": "Honda", "model": "Accord", "year": 2003}
        }"#;
        let profile = VehicleProfile::from_json(json).unwrap();
        assert_eq!(profile.sensors.rpm_idle, 750);
        assert!(profile.dtcs.is_empty());
    }

    #[test]
    fn rejects_short_vin() {
        let json = r#"{"vehicle": {"vin": "SHORT", "make": "x", "model": "y", "year": 2020}}"#;
        assert!(VehicleProfile::from_json(json).is_err());
    }

    #[test]
    fn rejects_malformed_dtc_code() {
        let json = r#"{
            "vehicle": {"vin": "1HGCM82633A004352", "make": "Honda", "model": "Accord", "year": 2003},
            "dtcs": [{"code": "ZZZZZ", "description": "bad", "probability": 0.5}]
        }"#;
        assert!(VehicleProfile::from_json(json).is_err());
    }
}
