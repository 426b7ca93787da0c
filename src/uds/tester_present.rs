//! `0x3E` TesterPresent.

use super::{negative, UdsContext, NRC_SUBFUNCTION_NOT_SUPPORTED};

const SUPPRESS_POSITIVE_RESPONSE: u8 = 0x80;

/// Returns an empty `Vec` when the caller asked to suppress the positive
/// response; the ECU actor treats an empty response as "send nothing".
pub(super) fn handle(request: &[u8], ctx: &mut UdsContext<'_>) -> Vec<u8> {
    let Some(&sub) = request.get(1) else {
        return negative(0x3E, NRC_SUBFUNCTION_NOT_SUPPORTED);
    };
    ctx.session.refresh_activity();
    let base = sub & !SUPPRESS_POSITIVE_RESPONSE;
    if base != 0x00 {
        return negative(0x3E, NRC_SUBFUNCTION_NOT_SUPPORTED);
    }
    if sub & SUPPRESS_POSITIVE_RESPONSE != 0 {
        Vec::new()
    } else {
        vec![0x7E, 0x00]
    }
}
