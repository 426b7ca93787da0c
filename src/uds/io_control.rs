//! `0x2F` InputOutputControlByIdentifier.

use super::{negative, UdsContext, NRC_CONDITIONS_NOT_CORRECT, NRC_REQUEST_OUT_OF_RANGE};
use crate::vehicle::{EngineState, IgnitionState, ParamOverrides};

const OPT_RETURN_CONTROL: u8 = 0x00;
const OPT_RESET_TO_DEFAULT: u8 = 0x01;
const OPT_FREEZE_CURRENT_STATE: u8 = 0x02;
const OPT_SHORT_TERM_ADJUSTMENT: u8 = 0x03;

/// Throttle-plate actuator, driven by `shortTermAdjustment`. Requires KOEO.
const DID_THROTTLE_ACTUATOR: u16 = 0x1201;

pub(super) fn handle(request: &[u8], ctx: &mut UdsContext<'_>) -> Vec<u8> {
    if request.len() < 4 {
        return negative(0x2F, NRC_REQUEST_OUT_OF_RANGE);
    }
    let did = u16::from_be_bytes([request[1], request[2]]);
    let opt = request[3];
    if did != DID_THROTTLE_ACTUATOR {
        return negative(0x2F, NRC_REQUEST_OUT_OF_RANGE);
    }

    match opt {
        OPT_RETURN_CONTROL | OPT_RESET_TO_DEFAULT | OPT_FREEZE_CURRENT_STATE => {
            vec![0x6F, request[1], request[2], opt]
        }
        OPT_SHORT_TERM_ADJUSTMENT => {
            let Some(&value) = request.get(4) else {
                return negative(0x2F, NRC_REQUEST_OUT_OF_RANGE);
            };
            let mut vehicle = ctx.vehicle.lock().unwrap();
            let koeo = vehicle.ignition_state() == IgnitionState::On
                && vehicle.engine_state() == EngineState::Off;
            if !koeo {
                return negative(0x2F, NRC_CONDITIONS_NOT_CORRECT);
            }
            vehicle.set_params(ParamOverrides {
                rpm: None,
                speed: None,
                throttle: Some(value.min(100)),
            });
            vec![0x6F, request[1], request[2], opt, value]
        }
        _ => negative(0x2F, NRC_REQUEST_OUT_OF_RANGE),
    }
}
