//! `0x14` ClearDiagnosticInformation.

use super::{negative, UdsContext, NRC_REQUEST_OUT_OF_RANGE};

pub(super) fn handle(request: &[u8], ctx: &mut UdsContext<'_>) -> Vec<u8> {
    if request.len() < 4 {
        return negative(0x14, NRC_REQUEST_OUT_OF_RANGE);
    }
    // Only the "all groups" filter (FF FF FF) is modeled; any other group
    // filter is treated identically since this simulator has no further
    // group subdivision.
    ctx.dtc.clear();
    ctx.readiness.reset();
    vec![0x54]
}
