//! The ECU actor: one cooperatively scheduled task owning one ISO-TP
//! session, one DTC manager, one UDS session, and a handle to the shared
//! vehicle simulator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::bus::FUNCTIONAL_REQUEST_ID;
use crate::dtc::{DtcCode, DtcManager, DtcRecord};
use crate::error::SimResult;
use crate::isotp::{IsoTpEvent, IsoTpSession};
use crate::obd2::{self, ObdContext};
use crate::uds::{self, RoutineRegistry, UdsContext, UdsSession};
use crate::vehicle::{DtcTriggerEvent, EngineState, IgnitionState, ReadinessSet, VehicleSimulator};

/// How long the actor's main loop blocks on the bus per iteration before
/// checking for shutdown and DTC-trigger events.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A request from the control surface to this ECU's own thread, since the
/// ECU exclusively owns its DTC manager and readiness monitors.
pub enum ControlCommand {
    InjectDtc {
        code: DtcCode,
        description: String,
        mil_illuminate: bool,
        freeze: bool,
        reply: mpsc::Sender<SimResult<()>>,
    },
    ClearDtcs {
        reply: mpsc::Sender<SimResult<()>>,
    },
    ListDtcs {
        reply: mpsc::Sender<Vec<DtcRecord>>,
    },
    GetReadiness {
        reply: mpsc::Sender<ReadinessSet>,
    },
}

/// Identity and per-ECU state bound to one request/response address pair.
pub struct Ecu {
    name: String,
    isotp: IsoTpSession,
    dtc: DtcManager,
    readiness: ReadinessSet,
    uds_session: UdsSession,
    routines: RoutineRegistry,
    asset_tag: Option<Vec<u8>>,
    vehicle: Arc<Mutex<VehicleSimulator>>,
    vin: String,
    dtc_events_rx: Option<mpsc::Receiver<Vec<DtcTriggerEvent>>>,
    control_rx: mpsc::Receiver<ControlCommand>,
    running: Arc<AtomicBool>,
    last_readiness_tick: Instant,
}

impl Ecu {
    /// Builds a new ECU actor. `dtc_events_rx` is `Some` only for the ECU
    /// designated to own the vehicle's seeded DTC trigger table (normally
    /// the engine ECU); other ECUs never receive trigger events.
    pub fn new(
        name: impl Into<String>,
        isotp: IsoTpSession,
        vehicle: Arc<Mutex<VehicleSimulator>>,
        vin: impl Into<String>,
        readiness: ReadinessSet,
        boot_nonce: u32,
        dtc_events_rx: Option<mpsc::Receiver<Vec<DtcTriggerEvent>>>,
        control_rx: mpsc::Receiver<ControlCommand>,
    ) -> Self {
        Self {
            name: name.into(),
            isotp,
            dtc: DtcManager::new(),
            readiness,
            uds_session: UdsSession::new(boot_nonce),
            routines: RoutineRegistry::default(),
            asset_tag: None,
            vehicle,
            vin: vin.into(),
            dtc_events_rx,
            control_rx,
            running: Arc::new(AtomicBool::new(true)),
            last_readiness_tick: Instant::now(),
        }
    }

    /// Logical name, e.g. `"engine"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A handle that can be used to request shutdown from another thread.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Runs the actor loop until `running` is cleared. Intended to be
    /// spawned as its own OS thread.
    pub fn run(&mut self) {
        while self.running.load(Ordering::Relaxed) {
            self.drain_dtc_events();
            self.drain_control_commands();
            self.advance_readiness();

            let Some(frame) = self.isotp.next_frame(POLL_INTERVAL) else {
                continue;
            };
            let source_id = frame.id();
            let is_functional = source_id == FUNCTIONAL_REQUEST_ID;

            match self.isotp.handle_inbound(&frame) {
                IsoTpEvent::Complete(payload) => self.dispatch(&payload, is_functional),
                IsoTpEvent::Pending | IsoTpEvent::Discarded => {}
            }
        }
        self.isotp.reset();
    }

    /// Advances this ECU's readiness monitors by the wall-clock time
    /// elapsed since the last call, while the engine is running (per §4.4
    /// step 5: drive-cycle progression only advances while `RUNNING`).
    fn advance_readiness(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_readiness_tick);
        self.last_readiness_tick = now;
        if self.vehicle.lock().unwrap().engine_state() == EngineState::Running {
            self.readiness.tick_running(dt);
        }
    }

    fn drain_dtc_events(&mut self) {
        let Some(rx) = &self.dtc_events_rx else {
            return;
        };
        let mut applied = false;
        while let Ok(events) = rx.try_recv() {
            for event in events {
                self.dtc.trigger(
                    event.code,
                    event.description,
                    event.mil_illuminate,
                    true,
                    Some(event.snapshot),
                );
                applied = true;
            }
        }
        if applied {
            self.vehicle.lock().unwrap().set_mil_on(self.dtc.mil_on());
        }
    }

    fn drain_control_commands(&mut self) {
        while let Ok(cmd) = self.control_rx.try_recv() {
            match cmd {
                ControlCommand::InjectDtc {
                    code,
                    description,
                    mil_illuminate,
                    freeze,
                    reply,
                } => {
                    let snapshot = freeze.then(|| self.vehicle.lock().unwrap().snapshot());
                    self.dtc.inject(code, description, mil_illuminate, true, snapshot);
                    self.vehicle.lock().unwrap().set_mil_on(self.dtc.mil_on());
                    let _ = reply.send(Ok(()));
                }
                ControlCommand::ClearDtcs { reply } => {
                    self.dtc.clear();
                    self.readiness.reset();
                    self.vehicle.lock().unwrap().set_mil_on(self.dtc.mil_on());
                    let _ = reply.send(Ok(()));
                }
                ControlCommand::ListDtcs { reply } => {
                    let records: Vec<_> = self.dtc.all().cloned().collect();
                    let _ = reply.send(records);
                }
                ControlCommand::GetReadiness { reply } => {
                    let _ = reply.send(self.readiness.clone());
                }
            }
        }
    }

    fn dispatch(&mut self, payload: &[u8], is_functional: bool) {
        if self.vehicle.lock().unwrap().ignition_state() == IgnitionState::Off {
            // Powered down: the bus is silent, matching a real ECU that
            // doesn't answer once its wake-up line drops.
            return;
        }
        let Some(&service) = payload.first() else {
            return;
        };
        let response = match service {
            0x01..=0x0A => {
                let snapshot = self.vehicle.lock().unwrap().snapshot();
                let mut ctx = ObdContext {
                    snapshot,
                    dtc: &mut self.dtc,
                    readiness: &mut self.readiness,
                    vin: &self.vin,
                };
                let resp = obd2::dispatch(payload, &mut ctx);
                self.vehicle.lock().unwrap().set_mil_on(self.dtc.mil_on());
                resp
            }
            0x10..=0x85 => {
                let mut ctx = UdsContext {
                    session: &mut self.uds_session,
                    dtc: &mut self.dtc,
                    readiness: &mut self.readiness,
                    vehicle: &self.vehicle,
                    vin: &self.vin,
                    routines: &mut self.routines,
                    asset_tag: &mut self.asset_tag,
                };
                let resp = uds::dispatch(payload, &mut ctx);
                self.vehicle.lock().unwrap().set_mil_on(self.dtc.mil_on());
                resp
            }
            _ => {
                if is_functional {
                    Vec::new()
                } else {
                    vec![0x7F, service, uds::NRC_SERVICE_NOT_SUPPORTED]
                }
            }
        };

        // Functional-address broadcasts never get a negative response: an
        // ECU that isn't applicable to the request just stays silent (§4.5).
        if is_functional && response.first() == Some(&0x7F) {
            return;
        }

        if response.is_empty() {
            return;
        }
        if let Err(e) = self.isotp.send(&response) {
            warn!("ECU '{}': failed to send response: {e}", self.name);
        } else {
            debug!("ECU '{}': sent {} byte response", self.name, response.len());
        }
    }
}
