//! OBD-II legacy mode handlers (modes `0x01..=0x0A`).
//!
//! Every handler is a stateless function from `(mode, pid, vehicle
//! snapshot, DTC set)` to response bytes, dispatched here by the leading
//! service byte. Negative responses use the UDS `0x7F svc NRC` format even
//! though these services predate UDS.

mod mode01;
mod mode02;
mod mode03_07_0a;
mod mode04;
mod mode06_08;
mod mode09;

use crate::dtc::DtcManager;
use crate::uds::NRC_SERVICE_NOT_SUPPORTED;
use crate::vehicle::{ReadinessSet, Snapshot};

/// Everything an OBD-II handler needs to read or mutate.
pub struct ObdContext<'a> {
    pub snapshot: Snapshot,
    pub dtc: &'a mut DtcManager,
    pub readiness: &'a mut ReadinessSet,
    pub vin: &'a str,
}

/// Dispatches a reassembled OBD-II request (mode byte first) and returns
/// the reassembled response payload, ready for ISO-TP segmentation.
pub fn dispatch(request: &[u8], ctx: &mut ObdContext<'_>) -> Vec<u8> {
    let Some(&mode) = request.first() else {
        return negative(0x00, NRC_SERVICE_NOT_SUPPORTED);
    };
    match mode {
        0x01 => mode01::handle(request, ctx),
        0x02 => mode02::handle(request, ctx),
        0x03 => mode03_07_0a::handle(mode, ctx),
        0x07 => mode03_07_0a::handle(mode, ctx),
        0x0A => mode03_07_0a::handle(mode, ctx),
        0x04 => mode04::handle(ctx),
        0x06 => mode06_08::handle(mode, request),
        0x08 => mode06_08::handle(mode, request),
        0x09 => mode09::handle(request, ctx),
        _ => negative(mode, NRC_SERVICE_NOT_SUPPORTED),
    }
}

/// Builds a `0x7F <service> <nrc>` negative response.
pub(crate) fn negative(service: u8, nrc: u8) -> Vec<u8> {
    vec![0x7F, service, nrc]
}

/// Builds a bitmap response for a supported-PID request (`0x00`, `0x20`,
/// `0x40`, ...): four bytes covering PIDs `base+1..=base+32`, MSB-first,
/// with the low bit of the last byte asserted whenever any PID in the
/// following block is supported (signalling "query the next range too").
pub(crate) fn supported_bitmap(base: u8, is_supported: impl Fn(u8) -> bool) -> [u8; 4] {
    let mut bitmap = [0u8; 4];
    for offset in 0u8..32 {
        let pid = base.wrapping_add(offset + 1);
        if is_supported(pid) {
            let byte_idx = (offset / 8) as usize;
            let bit = 7 - (offset % 8);
            bitmap[byte_idx] |= 1 << bit;
        }
    }
    bitmap
}
