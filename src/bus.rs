//! The shared virtual CAN bus and the coordinator that demultiplexes frames
//! from it to the ECU whose request ID matches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, trace};

use crate::can::{CanError, CanFrame, CanTransceiver};

/// Conventional OBD-II functional request ID: delivered to every ECU.
pub const FUNCTIONAL_REQUEST_ID: u16 = 0x7DF;

struct BusInner {
    endpoints: Vec<mpsc::Sender<CanFrame>>,
}

/// An in-process virtual CAN bus. Every endpoint sees every other
/// endpoint's frames (but not its own), matching a real multi-drop bus.
/// Writes are serialized through the bus's internal mutex, the only shared
/// mutable resource ECUs contend over.
#[derive(Clone)]
pub struct CanBus {
    inner: Arc<Mutex<BusInner>>,
}

impl Default for CanBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CanBus {
    /// Creates a new, empty bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner { endpoints: Vec::new() })),
        }
    }

    /// Connects a new endpoint to the bus, returning a handle that can send
    /// and receive frames.
    pub fn connect(&self) -> BusEndpoint {
        let (tx, rx) = mpsc::channel();
        let mut inner = self.inner.lock().unwrap();
        let index = inner.endpoints.len();
        inner.endpoints.push(tx);
        BusEndpoint {
            bus: self.inner.clone(),
            self_index: index,
            rx,
        }
    }

    /// Connects a send-only handle: broadcasts onto the bus like
    /// [`Self::connect`]'s endpoint, but registers no inbox of its own.
    /// For a caller that only ever reads frames through some other
    /// channel (the [`BusCoordinator`]'s per-ECU routing, for one), a full
    /// [`BusEndpoint`] would still receive a clone of every broadcast frame
    /// into an `rx` nothing ever drains -- an unbounded leak for the life
    /// of the bus.
    fn connect_sender(&self) -> BusSender {
        BusSender {
            bus: self.inner.clone(),
        }
    }
}

/// A broadcast-only connection to a [`CanBus`]: can send, has no inbox.
struct BusSender {
    bus: Arc<Mutex<BusInner>>,
}

impl BusSender {
    fn send(&self, frame: CanFrame) {
        let inner = self.bus.lock().unwrap();
        for endpoint in inner.endpoints.iter() {
            // A peer having disconnected isn't an error for the sender.
            let _ = endpoint.send(frame.clone());
        }
    }
}

/// One connection to a [`CanBus`]: a private inbound queue plus the ability
/// to broadcast frames to every other connected endpoint.
pub struct BusEndpoint {
    bus: Arc<Mutex<BusInner>>,
    self_index: usize,
    rx: mpsc::Receiver<CanFrame>,
}

impl CanTransceiver for BusEndpoint {
    fn send(&self, frame: CanFrame) -> Result<(), CanError> {
        let inner = self.bus.lock().unwrap();
        for (idx, endpoint) in inner.endpoints.iter().enumerate() {
            if idx == self.self_index {
                continue;
            }
            // A peer having disconnected isn't an error for the sender.
            let _ = endpoint.send(frame.clone());
        }
        Ok(())
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<CanFrame, CanError> {
        self.rx.recv_timeout(timeout).map_err(|_| CanError::Timeout)
    }
}

/// Routes frames observed on the bus to the ECU(s) whose request ID they
/// match, plus every ECU for the functional broadcast ID. Owns the set of
/// registered ECUs exclusively, per the ownership model.
pub struct BusCoordinator {
    bus: CanBus,
    routes: Arc<Mutex<HashMap<u16, mpsc::Sender<CanFrame>>>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BusCoordinator {
    /// Creates a coordinator bound to `bus`.
    pub fn new(bus: CanBus) -> Self {
        Self {
            bus,
            routes: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Registers an ECU's request ID and returns the channel it should read
    /// demultiplexed inbound frames from, plus a send-only bus handle it
    /// can use to transmit responses.
    fn register(&self, request_id: u16) -> (mpsc::Receiver<CanFrame>, BusSender) {
        let (tx, rx) = mpsc::channel();
        self.routes.lock().unwrap().insert(request_id, tx);
        (rx, self.bus.connect_sender())
    }

    /// Like [`Self::register`], bundled into a single [`CanTransceiver`]:
    /// sends broadcast onto the bus, receives only frames the coordinator
    /// has routed to `request_id`. This is what every ECU actor's ISO-TP
    /// session is built on. Unlike [`Self::connect_tester`], the sender
    /// half registers no broadcast inbox of its own -- its inbound frames
    /// arrive exclusively via the coordinator's demultiplexed channel.
    pub fn register_channel(&self, request_id: u16) -> RoutedEndpoint {
        let (inbound, sender) = self.register(request_id);
        RoutedEndpoint { sender, inbound }
    }

    /// Connects a raw, unrouted endpoint onto the bus -- what a scan tool
    /// or test harness uses to send requests and observe every response,
    /// since responses aren't demultiplexed (only requests are).
    pub fn connect_tester(&self) -> BusEndpoint {
        self.bus.connect()
    }
}

/// A send-only [`BusSender`] paired with the demultiplexed receiver a
/// [`BusCoordinator`] routed to one request ID.
pub struct RoutedEndpoint {
    sender: BusSender,
    inbound: mpsc::Receiver<CanFrame>,
}

impl CanTransceiver for RoutedEndpoint {
    fn send(&self, frame: CanFrame) -> Result<(), CanError> {
        self.sender.send(frame);
        Ok(())
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<CanFrame, CanError> {
        self.inbound.recv_timeout(timeout).map_err(|_| CanError::Timeout)
    }
}

impl BusCoordinator {
    /// Starts the demultiplexing thread. Must be called once, after every
    /// ECU has registered.
    pub fn start(&mut self) {
        let sniffer = self.bus.connect();
        let routes = self.routes.clone();
        self.running.store(true, Ordering::Relaxed);
        let running = self.running.clone();
        self.handle = Some(std::thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                match sniffer.recv_timeout(Duration::from_millis(200)) {
                    Ok(frame) => {
                        trace!("bus coordinator observed frame 0x{:03X}", frame.id());
                        let routes = routes.lock().unwrap();
                        if frame.id() == FUNCTIONAL_REQUEST_ID {
                            for sender in routes.values() {
                                let _ = sender.send(frame.clone());
                            }
                        } else if let Some(sender) = routes.get(&frame.id()) {
                            let _ = sender.send(frame.clone());
                        }
                    }
                    Err(CanError::Timeout) => continue,
                    Err(CanError::Closed) => break,
                }
            }
        }));
        debug!("bus coordinator started");
    }

    /// Signals the demultiplexing thread to stop and joins it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BusCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}
