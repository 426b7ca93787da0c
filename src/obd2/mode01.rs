//! Mode 01: show current data.

use super::{negative, supported_bitmap, ObdContext};
use crate::uds::NRC_REQUEST_OUT_OF_RANGE;
use crate::vehicle::{Monitor, MonitorState, Snapshot};

/// PIDs this simulator answers for, besides the supported-bitmap PIDs
/// themselves (`0x00`, `0x20`, `0x40`, ...).
const SUPPORTED_DATA_PIDS: &[u8] = &[0x01, 0x04, 0x05, 0x0C, 0x0D, 0x0F, 0x10, 0x11, 0x1F, 0x21, 0x2F];

fn is_bitmap_pid(pid: u8) -> bool {
    pid == 0x00 || (pid != 0 && pid % 0x20 == 0)
}

fn is_supported(pid: u8) -> bool {
    is_bitmap_pid(pid) || SUPPORTED_DATA_PIDS.contains(&pid)
}

pub(super) fn handle(request: &[u8], ctx: &mut ObdContext<'_>) -> Vec<u8> {
    let pids = &request[1..];
    if pids.is_empty() {
        return negative(0x01, NRC_REQUEST_OUT_OF_RANGE);
    }
    let mut response = vec![0x41];
    let snap = ctx.snapshot;
    for &pid in pids.iter().take(6) {
        if is_bitmap_pid(pid) {
            response.push(pid);
            response.extend_from_slice(&supported_bitmap(pid, is_supported));
            continue;
        }
        match encode_pid(pid, &snap, ctx) {
            Some(data) => {
                response.push(pid);
                response.extend_from_slice(&data);
            }
            None => return negative(0x01, NRC_REQUEST_OUT_OF_RANGE),
        }
    }
    response
}

/// Encodes a single data PID's value bytes (not including the PID byte
/// itself).
pub(super) fn encode_pid(pid: u8, snap: &Snapshot, ctx: &mut ObdContext<'_>) -> Option<Vec<u8>> {
    match pid {
        0x01 => Some(monitor_status(ctx)),
        0x04 => Some(vec![(snap.engine_load as u16 * 255 / 100) as u8]),
        0x05 => Some(vec![(snap.coolant_temp + 40) as u8]),
        0x0C => {
            let raw = snap.rpm as u32 * 4;
            Some(vec![(raw >> 8) as u8, raw as u8])
        }
        0x0D => Some(vec![snap.speed]),
        0x0F => Some(vec![(snap.intake_temp + 40) as u8]),
        0x10 => {
            let raw = (snap.maf * 100.0).round().clamp(0.0, 65535.0) as u16;
            Some(vec![(raw >> 8) as u8, raw as u8])
        }
        0x11 => Some(vec![(snap.throttle as u16 * 255 / 100) as u8]),
        0x1F => Some(vec![(snap.runtime_s >> 8) as u8, snap.runtime_s as u8]),
        0x21 => Some(vec![
            (snap.distance_mil_on >> 8) as u8,
            snap.distance_mil_on as u8,
        ]),
        0x2F => Some(vec![(snap.fuel_level as u16 * 255 / 100) as u8]),
        _ => None,
    }
}

/// Monitor status (PID `0x01`): MIL + DTC count, plus supported/incomplete
/// bitmaps for the eight non-continuous monitors.
fn monitor_status(ctx: &mut ObdContext<'_>) -> Vec<u8> {
    let mil = ctx.dtc.mil_on();
    let count = ctx.dtc.confirmed_count();
    let byte1 = ((mil as u8) << 7) | (count & 0x7F);

    // Byte 2: ignition type (spark, bit3=0) plus continuous-monitor support
    // (misfire, fuel system, components -- always supported here).
    let byte2 = 0b0000_0111u8;

    let monitors = [
        Monitor::Catalyst,
        Monitor::HeatedCatalyst,
        Monitor::Evap,
        Monitor::SecondaryAir,
        Monitor::AcRefrigerant,
        Monitor::O2Sensor,
        Monitor::O2Heater,
        Monitor::Egr,
    ];
    let mut supported_byte = 0u8;
    let mut incomplete_byte = 0u8;
    for (i, m) in monitors.iter().enumerate() {
        let bit = 7 - i as u8;
        match ctx.readiness.get(*m) {
            MonitorState::Unsupported => {}
            MonitorState::Incomplete(_) => {
                supported_byte |= 1 << bit;
                incomplete_byte |= 1 << bit;
            }
            MonitorState::Complete => {
                supported_byte |= 1 << bit;
            }
        }
    }
    vec![byte1, byte2, supported_byte, incomplete_byte]
}
