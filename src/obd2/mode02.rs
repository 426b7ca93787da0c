//! Mode 02: freeze frame data.

use super::mode01::encode_pid;
use super::{negative, ObdContext};
use crate::uds::NRC_REQUEST_OUT_OF_RANGE;

pub(super) fn handle(request: &[u8], ctx: &mut ObdContext<'_>) -> Vec<u8> {
    if request.len() < 3 {
        return negative(0x02, NRC_REQUEST_OUT_OF_RANGE);
    }
    let pid = request[1];
    let frame_number = request[2];
    if frame_number != 0 {
        // Only one stored freeze frame (record 0) is modeled.
        return negative(0x02, NRC_REQUEST_OUT_OF_RANGE);
    }
    let Some(snap) = ctx.dtc.all().find_map(|r| r.freeze_frame) else {
        return negative(0x02, NRC_REQUEST_OUT_OF_RANGE);
    };
    match encode_pid(pid, &snap, ctx) {
        Some(data) => {
            let mut response = vec![0x42, pid, frame_number];
            response.extend_from_slice(&data);
            response
        }
        None => negative(0x02, NRC_REQUEST_OUT_OF_RANGE),
    }
}
