//! Mode 04: clear diagnostic trouble codes.

use super::ObdContext;

pub(super) fn handle(ctx: &mut ObdContext<'_>) -> Vec<u8> {
    ctx.dtc.clear();
    ctx.readiness.reset();
    vec![0x44]
}
