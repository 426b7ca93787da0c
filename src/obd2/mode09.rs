//! Mode 09: vehicle information.

use super::{negative, ObdContext};
use crate::uds::NRC_REQUEST_OUT_OF_RANGE;

pub(super) fn handle(request: &[u8], ctx: &mut ObdContext<'_>) -> Vec<u8> {
    let Some(&info_type) = request.get(1) else {
        return negative(0x09, NRC_REQUEST_OUT_OF_RANGE);
    };
    match info_type {
        0x02 => {
            let mut response = vec![0x49, 0x02, 0x01];
            response.extend_from_slice(ctx.vin.as_bytes());
            response
        }
        // Calibration ID / CVN / ECU name etc. are out of scope; reproduce
        // the shape with an empty payload rather than fabricate data.
        _ => vec![0x49, info_type, 0x00],
    }
}
