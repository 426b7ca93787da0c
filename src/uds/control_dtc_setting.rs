//! `0x85` ControlDTCSetting.

use super::{negative, UdsContext, NRC_SUBFUNCTION_NOT_SUPPORTED};

const SUB_ON: u8 = 0x01;
const SUB_OFF: u8 = 0x02;

pub(super) fn handle(request: &[u8], ctx: &mut UdsContext<'_>) -> Vec<u8> {
    let Some(&sub) = request.get(1) else {
        return negative(0x85, NRC_SUBFUNCTION_NOT_SUPPORTED);
    };
    match sub {
        SUB_ON => {
            ctx.dtc.set_storage_enabled(true);
            vec![0xC5, sub]
        }
        SUB_OFF => {
            ctx.dtc.set_storage_enabled(false);
            vec![0xC5, sub]
        }
        _ => negative(0x85, NRC_SUBFUNCTION_NOT_SUPPORTED),
    }
}
