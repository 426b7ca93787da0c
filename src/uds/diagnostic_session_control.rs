//! `0x10` DiagnosticSessionControl.

use super::session::{DEFAULT_P2_MS, DEFAULT_P2_STAR_MS};
use super::{negative, UdsContext, NRC_SUBFUNCTION_NOT_SUPPORTED, NRC_SUBFUNCTION_NOT_SUPPORTED_IN_SESSION};
use crate::uds::session::DiagnosticSession;

pub(super) fn handle(request: &[u8], ctx: &mut UdsContext<'_>) -> Vec<u8> {
    let Some(&sub) = request.get(1) else {
        return negative(0x10, NRC_SUBFUNCTION_NOT_SUPPORTED);
    };
    let Some(target) = DiagnosticSession::from_subfunction(sub) else {
        return negative(0x10, NRC_SUBFUNCTION_NOT_SUPPORTED);
    };
    if !ctx.session.enter_session(target) {
        return negative(0x10, NRC_SUBFUNCTION_NOT_SUPPORTED_IN_SESSION);
    }
    // P2 is encoded directly in ms; P2* is encoded in units of 10ms per
    // ISO 14229's resolution for the extended timing parameter.
    let p2_star_tens = DEFAULT_P2_STAR_MS / 10;
    vec![
        0x50,
        target.to_byte(),
        (DEFAULT_P2_MS >> 8) as u8,
        DEFAULT_P2_MS as u8,
        (p2_star_tens >> 8) as u8,
        p2_star_tens as u8,
    ]
}
