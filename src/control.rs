//! The top-level simulator: wires the virtual bus, one actor thread per
//! ECU, and the vehicle tick task together, and exposes the synchronous,
//! lock-scoped control-surface operations a client embeds against.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::info;

use crate::bus::{BusCoordinator, CanBus};
use crate::dtc::{DtcCode, DtcRecord};
use crate::ecu::{ControlCommand, Ecu};
use crate::error::{SimError, SimResult};
use crate::isotp::IsoTpSession;
use crate::vehicle::{
    EngineState, IgnitionState, ParamOverrides, ReadinessSet, Snapshot, VehicleProfile, VehicleSimulator,
};

/// How often the vehicle tick task advances the physics model. Matches the
/// ECU actor's bus poll interval so a fired DTC trigger and its snapshot
/// reach the owning ECU within one tick.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// One configured ECU: its logical name and the CAN IDs it answers on.
/// Response ID defaults to `request_id + 8` per convention (§4.2) but can
/// be set explicitly for bench setups that don't follow it.
#[derive(Debug, Clone)]
pub struct EcuSpec {
    pub name: String,
    pub request_id: u16,
    pub response_id: u16,
    /// Whether this ECU owns the vehicle profile's seeded DTC trigger
    /// table. Exactly one ECU in a bus should set this, conventionally the
    /// engine ECU.
    pub owns_dtc_triggers: bool,
}

impl EcuSpec {
    /// Builds a spec with the conventional `request_id + 8` response ID.
    pub fn new(name: impl Into<String>, request_id: u16, owns_dtc_triggers: bool) -> Self {
        Self {
            name: name.into(),
            request_id,
            response_id: request_id + 8,
            owns_dtc_triggers,
        }
    }
}

/// The `inputOutputControlParameter` an actuator request is made with,
/// mirroring `0x2F`'s sub-function byte.
#[derive(Debug, Clone, Copy)]
pub enum ActuatorOption {
    ReturnControlToEcu,
    ResetToDefault,
    FreezeCurrentState,
    /// Drives the actuator to `0..=100`%. Requires key-on-engine-off.
    ShortTermAdjustment(u8),
}

/// Throttle-plate actuator DID, the only one this simulator models.
const DID_THROTTLE_ACTUATOR: u16 = 0x1201;

struct EcuHandle {
    name: String,
    control_tx: mpsc::Sender<ControlCommand>,
    running: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Drop for EcuHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

/// A complete simulated diagnostic network: virtual bus, bus coordinator,
/// one actor thread per configured ECU, and a dedicated vehicle tick
/// thread. Dropping a `Simulator` stops every thread it owns.
pub struct Simulator {
    vehicle: Arc<Mutex<VehicleSimulator>>,
    coordinator: BusCoordinator,
    ecus: Vec<EcuHandle>,
    tick_running: Arc<AtomicBool>,
    tick_handle: Option<JoinHandle<()>>,
}

impl Simulator {
    /// Builds and starts a simulator from a loaded vehicle profile.
    pub fn start(profile: &VehicleProfile, ecu_specs: &[EcuSpec], boot_nonce: u64) -> Self {
        let vehicle = Arc::new(Mutex::new(VehicleSimulator::from_profile(profile, boot_nonce)));
        Self::start_with_vehicle(vehicle, &profile.vehicle.vin, ecu_specs, boot_nonce)
    }

    /// Builds and starts a simulator with no profile, every sensor at its
    /// built-in default. Used by tests and ad-hoc bench setups.
    pub fn start_with_defaults(vin: impl Into<String>, ecu_specs: &[EcuSpec], boot_nonce: u64) -> Self {
        let vehicle = Arc::new(Mutex::new(VehicleSimulator::with_defaults(boot_nonce)));
        Self::start_with_vehicle(vehicle, &vin.into(), ecu_specs, boot_nonce)
    }

    fn start_with_vehicle(
        vehicle: Arc<Mutex<VehicleSimulator>>,
        vin: &str,
        ecu_specs: &[EcuSpec],
        boot_nonce: u64,
    ) -> Self {
        let bus = CanBus::new();
        let mut coordinator = BusCoordinator::new(bus);
        let mut ecus = Vec::with_capacity(ecu_specs.len());
        let mut tick_forwarders = Vec::new();

        for spec in ecu_specs {
            let channel = coordinator.register_channel(spec.request_id);
            let isotp = IsoTpSession::new(
                Box::new(channel),
                spec.response_id,
                vec![spec.request_id, crate::bus::FUNCTIONAL_REQUEST_ID],
            );

            let (dtc_events_tx, dtc_events_rx) = if spec.owns_dtc_triggers {
                let (tx, rx) = mpsc::channel();
                (Some(tx), Some(rx))
            } else {
                (None, None)
            };
            let (control_tx, control_rx) = mpsc::channel();

            let mut ecu = Ecu::new(
                spec.name.clone(),
                isotp,
                vehicle.clone(),
                vin,
                ReadinessSet::all_supported(),
                boot_nonce,
                dtc_events_rx,
                control_rx,
            );
            let running = ecu.shutdown_handle();
            let name = spec.name.clone();
            let join = std::thread::Builder::new()
                .name(format!("ecu-{name}"))
                .spawn(move || ecu.run())
                .expect("spawning ECU actor thread");

            ecus.push(EcuHandle {
                name,
                control_tx,
                running,
                join: Some(join),
            });

            if let Some(tx) = dtc_events_tx {
                tick_forwarders.push(tx);
            }
        }

        coordinator.start();
        info!("simulator started with {} ECU(s)", ecus.len());

        let tick_running = Arc::new(AtomicBool::new(true));
        let tick_handle = {
            let vehicle = vehicle.clone();
            let running = tick_running.clone();
            Some(
                std::thread::Builder::new()
                    .name("vehicle-tick".to_string())
                    .spawn(move || Self::tick_loop(vehicle, running, tick_forwarders))
                    .expect("spawning vehicle tick thread"),
            )
        };

        Self {
            vehicle,
            coordinator,
            ecus,
            tick_running,
            tick_handle,
        }
    }

    fn tick_loop(
        vehicle: Arc<Mutex<VehicleSimulator>>,
        running: Arc<AtomicBool>,
        forwarders: Vec<mpsc::Sender<Vec<crate::vehicle::DtcTriggerEvent>>>,
    ) {
        while running.load(Ordering::Relaxed) {
            std::thread::sleep(TICK_INTERVAL);
            let events = vehicle.lock().unwrap().tick(TICK_INTERVAL);
            if !events.is_empty() {
                for forwarder in &forwarders {
                    let _ = forwarder.send(events.clone());
                }
            }
        }
    }

    /// Stops every ECU actor, the bus coordinator, and the vehicle tick
    /// thread, and waits for them to exit.
    pub fn stop(&mut self) {
        self.tick_running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.tick_handle.take() {
            let _ = handle.join();
        }
        self.coordinator.stop();
        self.ecus.clear();
    }

    fn find(&self, ecu: &str) -> SimResult<&EcuHandle> {
        self.ecus
            .iter()
            .find(|h| h.name == ecu)
            .ok_or_else(|| SimError::EcuNotFound(ecu.to_string()))
    }

    /// Injects a DTC into `ecu`'s fault record set as if its trigger
    /// condition had fired, optionally capturing a freeze frame.
    pub fn inject_dtc(&self, ecu: &str, code: &str, freeze: bool) -> SimResult<()> {
        let dtc_code = DtcCode::parse(code)?;
        let (reply_tx, reply_rx) = mpsc::channel();
        self.find(ecu)?
            .control_tx
            .send(ControlCommand::InjectDtc {
                code: dtc_code,
                description: format!("injected {code}"),
                mil_illuminate: true,
                freeze,
                reply: reply_tx,
            })
            .map_err(|_| SimError::EcuNotFound(ecu.to_string()))?;
        reply_rx.recv().map_err(|_| SimError::EcuNotFound(ecu.to_string()))?
    }

    /// Clears DTCs on one named ECU, or on every ECU if `ecu` is `None`.
    pub fn clear_dtcs(&self, ecu: Option<&str>) -> SimResult<()> {
        match ecu {
            Some(name) => self.clear_one(name),
            None => {
                for handle in &self.ecus {
                    self.clear_one(&handle.name)?;
                }
                Ok(())
            }
        }
    }

    fn clear_one(&self, ecu: &str) -> SimResult<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.find(ecu)?
            .control_tx
            .send(ControlCommand::ClearDtcs { reply: reply_tx })
            .map_err(|_| SimError::EcuNotFound(ecu.to_string()))?;
        reply_rx.recv().map_err(|_| SimError::EcuNotFound(ecu.to_string()))?
    }

    /// Lists the fault records known to `ecu`, or every ECU's if `ecu` is
    /// `None`.
    pub fn list_dtcs(&self, ecu: Option<&str>) -> SimResult<Vec<DtcRecord>> {
        match ecu {
            Some(name) => self.list_one(name),
            None => {
                let mut all = Vec::new();
                for handle in &self.ecus {
                    all.extend(self.list_one(&handle.name)?);
                }
                Ok(all)
            }
        }
    }

    fn list_one(&self, ecu: &str) -> SimResult<Vec<DtcRecord>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.find(ecu)?
            .control_tx
            .send(ControlCommand::ListDtcs { reply: reply_tx })
            .map_err(|_| SimError::EcuNotFound(ecu.to_string()))?;
        reply_rx.recv().map_err(|_| SimError::EcuNotFound(ecu.to_string()))
    }

    /// Returns `ecu`'s readiness monitor set.
    pub fn get_readiness(&self, ecu: &str) -> SimResult<ReadinessSet> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.find(ecu)?
            .control_tx
            .send(ControlCommand::GetReadiness { reply: reply_tx })
            .map_err(|_| SimError::EcuNotFound(ecu.to_string()))?;
        reply_rx.recv().map_err(|_| SimError::EcuNotFound(ecu.to_string()))
    }

    /// Moves the key. Takes effect within one vehicle tick.
    pub fn set_ignition(&self, state: IgnitionState) {
        self.vehicle.lock().unwrap().set_ignition(state);
    }

    /// Requests engine start.
    pub fn start_engine(&self) {
        self.vehicle.lock().unwrap().start_engine();
    }

    /// Requests engine stop.
    pub fn stop_engine(&self) {
        self.vehicle.lock().unwrap().stop_engine();
    }

    /// Overrides rpm/speed/throttle directly, bypassing the tick task's own
    /// slewing. Unset fields are left at their current value.
    pub fn set_vehicle_params(&self, overrides: ParamOverrides) {
        self.vehicle.lock().unwrap().set_params(overrides);
    }

    /// Reads the current vehicle-wide sensor snapshot.
    pub fn get_snapshot(&self) -> Snapshot {
        self.vehicle.lock().unwrap().snapshot()
    }

    /// Connects a raw tester endpoint directly onto the virtual CAN bus,
    /// for driving the network the way a scan tool would: by sending and
    /// receiving [`crate::can::CanFrame`]s rather than going through the
    /// control surface. Used by integration tests and bench setups.
    pub fn connect_tester(&self) -> crate::bus::BusEndpoint {
        self.coordinator.connect_tester()
    }

    /// Drives the throttle-plate actuator directly, out of band from the
    /// `0x2F` wire service, subject to the same key-on-engine-off gating.
    pub fn actuator_control(&self, ecu: &str, did: u16, option: ActuatorOption) -> SimResult<()> {
        self.find(ecu)?;
        if did != DID_THROTTLE_ACTUATOR {
            return Err(SimError::ConditionNotMet(format!("no actuator at DID 0x{did:04X}")));
        }
        let mut vehicle = self.vehicle.lock().unwrap();
        match option {
            ActuatorOption::ReturnControlToEcu
            | ActuatorOption::ResetToDefault
            | ActuatorOption::FreezeCurrentState => Ok(()),
            ActuatorOption::ShortTermAdjustment(value) => {
                let koeo =
                    vehicle.ignition_state() == IgnitionState::On && vehicle.engine_state() == EngineState::Off;
                if !koeo {
                    return Err(SimError::ConditionNotMet(
                        "actuator control requires key-on-engine-off".to_string(),
                    ));
                }
                vehicle.set_params(ParamOverrides {
                    rpm: None,
                    speed: None,
                    throttle: Some(value.min(100)),
                });
                Ok(())
            }
        }
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.stop();
    }
}
