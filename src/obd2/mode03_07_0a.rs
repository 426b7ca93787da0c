//! Modes 03 / 07 / 0A: stored / pending / permanent DTC reports.

use super::ObdContext;
use crate::dtc::DtcState;

fn ack_service(mode: u8) -> u8 {
    mode | 0x40
}

fn state_for(mode: u8) -> &'static [DtcState] {
    match mode {
        0x03 => &[DtcState::Confirmed, DtcState::Permanent],
        0x07 => &[DtcState::Pending],
        0x0A => &[DtcState::Permanent],
        _ => &[],
    }
}

pub(super) fn handle(mode: u8, ctx: &mut ObdContext<'_>) -> Vec<u8> {
    let wanted = state_for(mode);
    let codes: Vec<_> = ctx
        .dtc
        .all()
        .filter(|r| wanted.contains(&r.state))
        .map(|r| r.code)
        .collect();

    let mut response = vec![ack_service(mode), codes.len() as u8];
    for code in codes {
        response.extend_from_slice(&code.to_bytes());
    }
    response
}
