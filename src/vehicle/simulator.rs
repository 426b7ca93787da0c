//! Process-wide vehicle physics model: the single-writer tick logic behind
//! every sensor-backed OBD-II/UDS response.

use std::time::Duration;

use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::ignition::{EngineState, IgnitionModel, IgnitionState};
use super::profile::VehicleProfile;
use super::snapshot::Snapshot;
use crate::dtc::DtcCode;

/// A configured DTC trigger: on every tick while the engine is running, it
/// fires with probability `probability`.
#[derive(Debug, Clone)]
pub struct DtcTrigger {
    pub code: DtcCode,
    pub description: String,
    pub mil_illuminate: bool,
    pub probability: f32,
}

/// A trigger that fired on a given tick, ready to be handed to the owning
/// ECU's DTC manager along with the snapshot taken at fire time.
#[derive(Debug, Clone)]
pub struct DtcTriggerEvent {
    pub code: DtcCode,
    pub description: String,
    pub mil_illuminate: bool,
    pub snapshot: Snapshot,
}

/// Bounded, externally supplied parameter overrides, as taken by
/// `set_vehicle_params` on the control surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParamOverrides {
    pub rpm: Option<u16>,
    pub speed: Option<u8>,
    pub throttle: Option<u8>,
}

/// The single process-wide vehicle model. Readers take a [`Snapshot`]
/// value copy; the tick task is the sole writer.
pub struct VehicleSimulator {
    ignition: IgnitionModel,
    rpm: u16,
    speed: u8,
    engine_load: u8,
    coolant_temp: i16,
    intake_temp: i16,
    maf: f32,
    throttle: u8,
    fuel_level: u8,
    battery_v: f32,
    runtime_s: u16,
    runtime_accum_ms: u32,
    distance_m: u32,
    distance_mil_on_m: u32,
    mil_on: bool,

    rpm_idle: u16,
    rpm_max: u16,
    coolant_normal: i16,

    triggers: Vec<DtcTrigger>,
    rng: SmallRng,
}

/// Slew rate toward the rpm target, in rpm per 100ms tick.
const RPM_SLEW_PER_100MS: i32 = 400;
/// Coolant warmup rate toward the configured normal temperature, °C per 100ms.
const COOLANT_WARMUP_PER_100MS: f32 = 0.15;
/// Speed slew rate toward the throttle-derived target, km/h per 100ms.
const SPEED_SLEW_PER_100MS: i32 = 3;

impl VehicleSimulator {
    /// Builds a simulator from a loaded profile, seeded from `boot_nonce`
    /// so a fixed nonce reproduces an entire run's DTC triggers and
    /// (via [`crate::uds::security_access`]) security seeds bit-for-bit.
    pub fn from_profile(profile: &VehicleProfile, boot_nonce: u64) -> Self {
        let triggers = profile
            .dtcs
            .iter()
            .filter_map(|seed| {
                DtcCode::parse(&seed.code).ok().map(|code| DtcTrigger {
                    code,
                    description: seed.description.clone(),
                    mil_illuminate: seed.mil_illuminate,
                    probability: seed.probability,
                })
            })
            .collect();
        Self {
            ignition: IgnitionModel::default(),
            rpm: 0,
            speed: 0,
            engine_load: 0,
            coolant_temp: 20,
            intake_temp: 20,
            maf: 0.0,
            throttle: 0,
            fuel_level: 75,
            battery_v: 12.6,
            runtime_s: 0,
            runtime_accum_ms: 0,
            distance_m: 0,
            distance_mil_on_m: 0,
            mil_on: false,
            rpm_idle: profile.sensors.rpm_idle,
            rpm_max: profile.sensors.rpm_max,
            coolant_normal: profile.sensors.coolant_temp_normal,
            triggers,
            rng: SmallRng::seed_from_u64(boot_nonce),
        }
    }

    /// A default simulator with no configured profile, for tests and ad-hoc
    /// use, seeded deterministically.
    pub fn with_defaults(boot_nonce: u64) -> Self {
        Self {
            ignition: IgnitionModel::default(),
            rpm: 0,
            speed: 0,
            engine_load: 0,
            coolant_temp: 20,
            intake_temp: 20,
            maf: 0.0,
            throttle: 0,
            fuel_level: 75,
            battery_v: 12.6,
            runtime_s: 0,
            runtime_accum_ms: 0,
            distance_m: 0,
            distance_mil_on_m: 0,
            mil_on: false,
            rpm_idle: 750,
            rpm_max: 6500,
            coolant_normal: 90,
            triggers: Vec::new(),
            rng: SmallRng::seed_from_u64(boot_nonce),
        }
    }

    /// Moves the key.
    pub fn set_ignition(&mut self, state: IgnitionState) {
        self.ignition.set_ignition(state);
        info!("ignition -> {:?}", state);
    }

    /// Requests engine start.
    pub fn start_engine(&mut self) {
        self.ignition.start_engine();
    }

    /// Requests engine stop.
    pub fn stop_engine(&mut self) {
        self.ignition.stop_engine();
    }

    /// Applies externally supplied parameter overrides (e.g. from the
    /// control surface's `set_vehicle_params`).
    pub fn set_params(&mut self, overrides: ParamOverrides) {
        if let Some(rpm) = overrides.rpm {
            self.rpm = rpm.min(16383);
        }
        if let Some(speed) = overrides.speed {
            self.speed = speed;
        }
        if let Some(throttle) = overrides.throttle {
            self.throttle = throttle.min(100);
        }
    }

    /// Syncs the cached MIL flag from the owning engine ECU's DTC manager,
    /// after it has applied this tick's [`DtcTriggerEvent`]s. `distance_mil_on`
    /// integration for the *next* tick uses this value.
    pub fn set_mil_on(&mut self, on: bool) {
        self.mil_on = on;
    }

    /// Advances the model by `dt` (expected ≤100ms) and returns any DTC
    /// triggers that fired this tick.
    pub fn tick(&mut self, dt: Duration) -> Vec<DtcTriggerEvent> {
        let engine_state = self.ignition.tick(dt);
        let fraction = dt.as_secs_f32() / 0.1;

        // rpm stays 0 through CRANKING: the starter isn't the engine's own
        // combustion turning it over, and the invariant `rpm == 0 <=>
        // engine_state NOT IN {RUNNING, STALLING}` requires it.
        let rpm_target: u16 = match engine_state {
            EngineState::Running => self.rpm_idle + (self.throttle as u16 * 40).min(self.rpm_max - self.rpm_idle),
            EngineState::Cranking | EngineState::Off => 0,
            EngineState::Stalling => self.rpm_idle,
        };
        self.rpm = slew_i32(
            self.rpm as i32,
            rpm_target as i32,
            (RPM_SLEW_PER_100MS as f32 * fraction) as i32,
        ) as u16;

        self.engine_load = if engine_state == EngineState::Running {
            (self.throttle / 2 + 10).min(100)
        } else {
            0
        };
        self.maf = (self.rpm as f32 / 1000.0) * (1.0 + self.engine_load as f32 / 100.0);

        let coolant_target = if matches!(engine_state, EngineState::Running | EngineState::Cranking) {
            self.coolant_normal
        } else {
            20
        };
        self.coolant_temp = slew_f32_to_i16(
            self.coolant_temp as f32,
            coolant_target as f32,
            COOLANT_WARMUP_PER_100MS * fraction,
        );

        let speed_target: u8 = if engine_state == EngineState::Running {
            ((self.throttle as u16 * 2).min(255)) as u8
        } else {
            0
        };
        self.speed = slew_i32(
            self.speed as i32,
            speed_target as i32,
            (SPEED_SLEW_PER_100MS as f32 * fraction) as i32,
        ) as u8;

        let dt_secs = dt.as_secs_f32();
        self.distance_m += (self.speed as f32 * 1000.0 / 3600.0 * dt_secs) as u32;
        if self.mil_on {
            self.distance_mil_on_m += (self.speed as f32 * 1000.0 / 3600.0 * dt_secs) as u32;
        }
        if engine_state == EngineState::Running {
            self.runtime_accum_ms += dt.as_millis() as u32;
            while self.runtime_accum_ms >= 1000 {
                self.runtime_accum_ms -= 1000;
                self.runtime_s = self.runtime_s.saturating_add(1);
            }
        }

        let mut events = Vec::new();
        if engine_state == EngineState::Running {
            let snapshot = self.snapshot();
            for trigger in &self.triggers {
                if self.rng.gen::<f32>() < trigger.probability {
                    events.push(DtcTriggerEvent {
                        code: trigger.code,
                        description: trigger.description.clone(),
                        mil_illuminate: trigger.mil_illuminate,
                        snapshot,
                    });
                }
            }
        }
        events
    }

    /// Takes a read-consistent value-type copy of the current state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            rpm: self.rpm,
            speed: self.speed,
            engine_load: self.engine_load,
            coolant_temp: self.coolant_temp,
            intake_temp: self.intake_temp,
            maf: self.maf,
            throttle: self.throttle,
            fuel_level: self.fuel_level,
            battery_v: self.battery_v,
            runtime_s: self.runtime_s,
            distance_mil_on: (self.distance_mil_on_m / 1000).min(u16::MAX as u32) as u16,
        }
    }

    /// Current engine state, for handlers that gate on KOEO.
    pub fn engine_state(&self) -> EngineState {
        self.ignition.engine()
    }

    /// Current ignition state.
    pub fn ignition_state(&self) -> IgnitionState {
        self.ignition.ignition()
    }
}

fn slew_i32(current: i32, target: i32, max_step: i32) -> i32 {
    let max_step = max_step.max(1);
    if current < target {
        (current + max_step).min(target)
    } else if current > target {
        (current - max_step).max(target)
    } else {
        current
    }
}

fn slew_f32_to_i16(current: f32, target: f32, max_step: f32) -> i16 {
    let max_step = max_step.max(0.01);
    let next = if current < target {
        (current + max_step).min(target)
    } else if current > target {
        (current - max_step).max(target)
    } else {
        current
    };
    next.round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpm_is_zero_unless_running_or_cranking() {
        let mut sim = VehicleSimulator::with_defaults(1);
        sim.tick(Duration::from_millis(100));
        assert_eq!(sim.snapshot().rpm, 0);
    }

    #[test]
    fn running_engine_climbs_toward_idle_rpm() {
        let mut sim = VehicleSimulator::with_defaults(1);
        sim.set_ignition(IgnitionState::Start);
        sim.start_engine();
        for _ in 0..30 {
            sim.tick(Duration::from_millis(100));
        }
        assert!(sim.snapshot().rpm > 0);
        assert_eq!(sim.engine_state(), EngineState::Running);
    }

    #[test]
    fn deterministic_seed_reproduces_identical_runs() {
        let mut a = VehicleSimulator::with_defaults(42);
        let mut b = VehicleSimulator::with_defaults(42);
        a.set_ignition(IgnitionState::Start);
        a.start_engine();
        b.set_ignition(IgnitionState::Start);
        b.start_engine();
        for _ in 0..20 {
            let ea = a.tick(Duration::from_millis(100));
            let eb = b.tick(Duration::from_millis(100));
            assert_eq!(ea.len(), eb.len());
        }
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn distance_mil_on_only_accumulates_while_mil_set() {
        let mut sim = VehicleSimulator::with_defaults(1);
        sim.set_ignition(IgnitionState::Start);
        sim.start_engine();
        sim.set_params(ParamOverrides {
            rpm: None,
            speed: None,
            throttle: Some(50),
        });
        for _ in 0..50 {
            sim.tick(Duration::from_millis(100));
        }
        assert_eq!(sim.snapshot().distance_mil_on, 0);
    }
}
