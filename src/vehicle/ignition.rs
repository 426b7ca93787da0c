//! Ignition and engine state machines.

use std::time::Duration;

/// Key position.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IgnitionState {
    /// Key removed.
    Off,
    /// Key turned to accessory: infotainment powered, engine cannot run.
    Accessory,
    /// Key fully on, engine not yet commanded to start.
    On,
    /// Key held in the spring-loaded start position.
    Start,
}

/// Engine run state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EngineState {
    /// Not running, rpm is 0.
    Off,
    /// Starter engaged, rpm ramping from 0 toward idle.
    Cranking,
    /// Running under its own power.
    Running,
    /// Rpm has fallen toward 0 unexpectedly (e.g. a stall fault injected
    /// into the simulation); transitions back to `Off` once rpm reaches 0.
    Stalling,
}

/// Minimum bound on cranking duration before the engine may catch.
pub const MIN_CRANK: Duration = Duration::from_millis(500);
/// Maximum bound on cranking duration; past this with no catch, give up.
pub const MAX_CRANK: Duration = Duration::from_secs(2);

/// The combined ignition/engine state machine advanced once per simulator
/// tick. Only `On` or `Start` permit entering `Cranking`; `Cranking`
/// resolves to `Running` (caught) or `Off` (timed out) within
/// `MIN_CRANK..=MAX_CRANK`.
#[derive(Debug)]
pub struct IgnitionModel {
    ignition: IgnitionState,
    engine: EngineState,
    crank_elapsed: Duration,
}

impl Default for IgnitionModel {
    fn default() -> Self {
        Self {
            ignition: IgnitionState::Off,
            engine: EngineState::Off,
            crank_elapsed: Duration::ZERO,
        }
    }
}

impl IgnitionModel {
    /// Current ignition state.
    pub fn ignition(&self) -> IgnitionState {
        self.ignition
    }

    /// Current engine state.
    pub fn engine(&self) -> EngineState {
        self.engine
    }

    /// Moves the key. Turning the key `Off` stops the engine unconditionally.
    pub fn set_ignition(&mut self, state: IgnitionState) {
        self.ignition = state;
        if state == IgnitionState::Off {
            self.engine = EngineState::Off;
            self.crank_elapsed = Duration::ZERO;
        }
    }

    /// Requests engine start. A no-op if already running or cranking; the
    /// engine only enters `Cranking` from `On`/`Start` ignition.
    pub fn start_engine(&mut self) {
        if self.engine == EngineState::Running || self.engine == EngineState::Cranking {
            return;
        }
        if matches!(self.ignition, IgnitionState::On | IgnitionState::Start) {
            self.engine = EngineState::Cranking;
            self.crank_elapsed = Duration::ZERO;
        }
    }

    /// Requests engine stop (ignition stays where it is).
    pub fn stop_engine(&mut self) {
        self.engine = EngineState::Off;
        self.crank_elapsed = Duration::ZERO;
    }

    /// Advances the state machine by `dt`. Returns the new engine state.
    pub fn tick(&mut self, dt: Duration) -> EngineState {
        if self.engine == EngineState::Cranking {
            self.crank_elapsed += dt;
            if self.crank_elapsed >= MIN_CRANK {
                self.engine = EngineState::Running;
                self.crank_elapsed = Duration::ZERO;
            } else if self.crank_elapsed >= MAX_CRANK {
                self.engine = EngineState::Off;
                self.crank_elapsed = Duration::ZERO;
            }
        }
        if self.engine == EngineState::Stalling {
            self.engine = EngineState::Off;
        }
        self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cranking_catches_after_min_duration() {
        let mut m = IgnitionModel::default();
        m.set_ignition(IgnitionState::Start);
        m.start_engine();
        assert_eq!(m.engine(), EngineState::Cranking);
        m.tick(MIN_CRANK);
        assert_eq!(m.engine(), EngineState::Running);
    }

    #[test]
    fn key_off_stops_engine_immediately() {
        let mut m = IgnitionModel::default();
        m.set_ignition(IgnitionState::On);
        m.start_engine();
        m.tick(MIN_CRANK);
        assert_eq!(m.engine(), EngineState::Running);
        m.set_ignition(IgnitionState::Off);
        assert_eq!(m.engine(), EngineState::Off);
    }

    #[test]
    fn cannot_crank_from_accessory() {
        let mut m = IgnitionModel::default();
        m.set_ignition(IgnitionState::Accessory);
        m.start_engine();
        assert_eq!(m.engine(), EngineState::Off);
    }
}
