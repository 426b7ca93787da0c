//! `0x31` RoutineControl.
//!
//! Routines run as detached background threads (no async runtime is
//! introduced elsewhere in the crate, so none is introduced here either);
//! `requestResult` polls a shared completion flag rather than blocking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{negative, UdsContext, NRC_REQUEST_OUT_OF_RANGE};

const SUB_START: u8 = 0x01;
const SUB_STOP: u8 = 0x02;
const SUB_REQUEST_RESULT: u8 = 0x03;

/// Routine-status byte returned by `requestResult`.
const STATUS_RUNNING: u8 = 0x01;
const STATUS_COMPLETED: u8 = 0x00;

/// How long each known routine takes to complete once started.
fn routine_duration(routine_id: u16) -> Duration {
    match routine_id {
        0x0203 => Duration::from_millis(300), // erase-memory style routine
        _ => Duration::from_millis(100),
    }
}

fn is_known_routine(routine_id: u16) -> bool {
    matches!(routine_id, 0x0203 | 0x0200)
}

struct RoutineHandle {
    done: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
}

/// Tracks in-flight routines for one ECU, keyed by routine identifier.
/// Owned by the ECU actor so it survives across dispatch calls.
#[derive(Default)]
pub struct RoutineRegistry {
    active: HashMap<u16, RoutineHandle>,
}

impl RoutineRegistry {
    fn start(&mut self, routine_id: u16) {
        let done = Arc::new(AtomicBool::new(false));
        let cancel = Arc::new(AtomicBool::new(false));
        let done_clone = done.clone();
        let cancel_clone = cancel.clone();
        let duration = routine_duration(routine_id);
        std::thread::spawn(move || {
            let step = Duration::from_millis(10);
            let mut waited = Duration::ZERO;
            while waited < duration {
                if cancel_clone.load(Ordering::Relaxed) {
                    return;
                }
                std::thread::sleep(step);
                waited += step;
            }
            done_clone.store(true, Ordering::Relaxed);
        });
        self.active.insert(routine_id, RoutineHandle { done, cancel });
    }

    fn stop(&mut self, routine_id: u16) {
        if let Some(handle) = self.active.remove(&routine_id) {
            handle.cancel.store(true, Ordering::Relaxed);
        }
    }

    fn status(&self, routine_id: u16) -> Option<u8> {
        self.active.get(&routine_id).map(|h| {
            if h.done.load(Ordering::Relaxed) {
                STATUS_COMPLETED
            } else {
                STATUS_RUNNING
            }
        })
    }
}

pub(super) fn handle(request: &[u8], ctx: &mut UdsContext<'_>) -> Vec<u8> {
    if request.len() < 4 {
        return negative(0x31, NRC_REQUEST_OUT_OF_RANGE);
    }
    let sub = request[1];
    let routine_id = u16::from_be_bytes([request[2], request[3]]);
    if !is_known_routine(routine_id) {
        return negative(0x31, NRC_REQUEST_OUT_OF_RANGE);
    }

    match sub {
        SUB_START => {
            ctx.routines.start(routine_id);
            vec![0x71, SUB_START, request[2], request[3]]
        }
        SUB_STOP => {
            ctx.routines.stop(routine_id);
            vec![0x71, SUB_STOP, request[2], request[3]]
        }
        SUB_REQUEST_RESULT => match ctx.routines.status(routine_id) {
            Some(status) => vec![0x71, SUB_REQUEST_RESULT, request[2], request[3], status],
            None => negative(0x31, NRC_REQUEST_OUT_OF_RANGE),
        },
        _ => negative(0x31, NRC_REQUEST_OUT_OF_RANGE),
    }
}
