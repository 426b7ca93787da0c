//! `0x2E` WriteDataByIdentifier.

use super::session::DiagnosticSession;
use super::{
    negative, UdsContext, DID_ASSET_TAG, NRC_REQUEST_OUT_OF_RANGE, NRC_SECURITY_ACCESS_DENIED,
    NRC_SERVICE_NOT_SUPPORTED_IN_SESSION,
};

pub(super) fn handle(request: &[u8], ctx: &mut UdsContext<'_>) -> Vec<u8> {
    if request.len() < 3 {
        return negative(0x2E, NRC_REQUEST_OUT_OF_RANGE);
    }
    let session = ctx.session.current();
    if !matches!(session, DiagnosticSession::Extended | DiagnosticSession::Programming) {
        return negative(0x2E, NRC_SERVICE_NOT_SUPPORTED_IN_SESSION);
    }
    if ctx.session.security_level() == 0 {
        return negative(0x2E, NRC_SECURITY_ACCESS_DENIED);
    }
    let did = u16::from_be_bytes([request[1], request[2]]);
    match did {
        DID_ASSET_TAG => {
            *ctx.asset_tag = Some(request[3..].to_vec());
            vec![0x6E, request[1], request[2]]
        }
        _ => negative(0x2E, NRC_REQUEST_OUT_OF_RANGE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtc::DtcManager;
    use crate::uds::{RoutineRegistry, UdsSession};
    use crate::vehicle::{ReadinessSet, VehicleSimulator};
    use std::sync::{Arc, Mutex};

    #[test]
    fn write_stores_the_payload_bytes() {
        let mut session = UdsSession::new(1);
        session.enter_session(DiagnosticSession::Extended);
        session.unlock(1);
        let mut dtc = DtcManager::new();
        let mut readiness = ReadinessSet::all_supported();
        let vehicle = Arc::new(Mutex::new(VehicleSimulator::with_defaults(1)));
        let mut routines = RoutineRegistry::default();
        let mut asset_tag = None;
        let mut ctx = UdsContext {
            session: &mut session,
            dtc: &mut dtc,
            readiness: &mut readiness,
            vehicle: &vehicle,
            vin: "1HGCM82633A004352",
            routines: &mut routines,
            asset_tag: &mut asset_tag,
        };

        let did = DID_ASSET_TAG.to_be_bytes();
        let resp = handle(&[0x2E, did[0], did[1], b'R', b'I', b'G', b'1'], &mut ctx);
        assert_eq!(resp, vec![0x6E, did[0], did[1]]);
        assert_eq!(asset_tag, Some(b"RIG1".to_vec()));
    }
}
