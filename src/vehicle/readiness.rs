//! Readiness monitors and drive-cycle progression.

use std::time::Duration;

/// The eleven OBD-II readiness monitors, in the conventional reporting
/// order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Monitor {
    Misfire,
    FuelSystem,
    Components,
    Catalyst,
    HeatedCatalyst,
    Evap,
    SecondaryAir,
    AcRefrigerant,
    O2Sensor,
    O2Heater,
    Egr,
}

/// All eleven monitors, in reporting order.
pub const ALL_MONITORS: [Monitor; 11] = [
    Monitor::Misfire,
    Monitor::FuelSystem,
    Monitor::Components,
    Monitor::Catalyst,
    Monitor::HeatedCatalyst,
    Monitor::Evap,
    Monitor::SecondaryAir,
    Monitor::AcRefrigerant,
    Monitor::O2Sensor,
    Monitor::O2Heater,
    Monitor::Egr,
];

/// Time, while `RUNNING`, for a supported monitor to complete its
/// self-test in one drive cycle. Not standardized; chosen to span a
/// plausible short-to-long drive-cycle range.
fn completion_budget(m: Monitor) -> Duration {
    match m {
        Monitor::Misfire => Duration::from_secs(10),
        Monitor::FuelSystem => Duration::from_secs(30),
        Monitor::Components => Duration::from_secs(20),
        Monitor::Catalyst => Duration::from_secs(300),
        Monitor::HeatedCatalyst => Duration::from_secs(240),
        Monitor::Evap => Duration::from_secs(600),
        Monitor::SecondaryAir => Duration::from_secs(120),
        Monitor::AcRefrigerant => Duration::from_secs(90),
        Monitor::O2Sensor => Duration::from_secs(180),
        Monitor::O2Heater => Duration::from_secs(60),
        Monitor::Egr => Duration::from_secs(150),
    }
}

/// Completion state of a single monitor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MonitorState {
    /// Vehicle does not have this monitor at all.
    Unsupported,
    /// Supported, not yet complete this drive cycle.
    Incomplete(Duration),
    /// Supported and complete this drive cycle.
    Complete,
}

/// The full set of readiness monitors for one ECU.
#[derive(Debug, Clone)]
pub struct ReadinessSet {
    states: std::collections::BTreeMap<Monitor, MonitorState>,
}

impl ReadinessSet {
    /// Builds a set where every monitor in `supported` starts `Incomplete`
    /// with its full budget remaining, and all others are `Unsupported`.
    pub fn new(supported: &[Monitor]) -> Self {
        let mut states = std::collections::BTreeMap::new();
        for m in ALL_MONITORS {
            let state = if supported.contains(&m) {
                MonitorState::Incomplete(completion_budget(m))
            } else {
                MonitorState::Unsupported
            };
            states.insert(m, state);
        }
        Self { states }
    }

    /// A set where all eleven monitors are supported.
    pub fn all_supported() -> Self {
        Self::new(&ALL_MONITORS)
    }

    /// Current state of `m`.
    pub fn get(&self, m: Monitor) -> MonitorState {
        self.states[&m]
    }

    /// Advances every `Incomplete` monitor's remaining budget by `dt` while
    /// the engine is running; monitors whose budget reaches zero become
    /// `Complete`. No-op for `Complete`/`Unsupported` monitors.
    pub fn tick_running(&mut self, dt: Duration) {
        for state in self.states.values_mut() {
            if let MonitorState::Incomplete(remaining) = state {
                if *remaining <= dt {
                    *state = MonitorState::Complete;
                } else {
                    *remaining -= dt;
                }
            }
        }
    }

    /// Resets every supported monitor back to `Incomplete` with a fresh
    /// budget, per the clear-DTC contract.
    pub fn reset(&mut self) {
        for (&m, state) in self.states.iter_mut() {
            if !matches!(state, MonitorState::Unsupported) {
                *state = MonitorState::Incomplete(completion_budget(m));
            }
        }
    }

    /// Iterates `(monitor, state)` pairs in reporting order.
    pub fn iter(&self) -> impl Iterator<Item = (Monitor, MonitorState)> + '_ {
        ALL_MONITORS.iter().map(move |&m| (m, self.states[&m]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_advances_monitor_to_complete() {
        let mut set = ReadinessSet::all_supported();
        set.tick_running(Duration::from_secs(11));
        assert_eq!(set.get(Monitor::Misfire), MonitorState::Complete);
        assert!(matches!(
            set.get(Monitor::Catalyst),
            MonitorState::Incomplete(_)
        ));
    }

    #[test]
    fn reset_returns_complete_monitors_to_incomplete() {
        let mut set = ReadinessSet::all_supported();
        set.tick_running(Duration::from_secs(700));
        assert_eq!(set.get(Monitor::Misfire), MonitorState::Complete);
        set.reset();
        assert!(matches!(
            set.get(Monitor::Misfire),
            MonitorState::Incomplete(_)
        ));
    }

    #[test]
    fn unsupported_monitor_never_completes() {
        let mut set = ReadinessSet::new(&[Monitor::Misfire]);
        set.tick_running(Duration::from_secs(10_000));
        assert_eq!(set.get(Monitor::Evap), MonitorState::Unsupported);
    }
}
