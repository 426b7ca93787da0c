//! `0x27` SecurityAccess.

use std::time::Instant;

use super::{
    negative, UdsContext, NRC_EXCEEDED_NUMBER_OF_ATTEMPTS, NRC_INVALID_KEY,
    NRC_SUBFUNCTION_NOT_SUPPORTED,
};

/// Level-1 key derivation mask. Higher levels would use a different mask;
/// only level 1 is implemented.
const LEVEL_1_MASK: u32 = 0x1234_5678;

fn is_request_seed(sub: u8) -> bool {
    sub % 2 == 1
}

pub(super) fn handle(request: &[u8], ctx: &mut UdsContext<'_>) -> Vec<u8> {
    let Some(&sub) = request.get(1) else {
        return negative(0x27, NRC_SUBFUNCTION_NOT_SUPPORTED);
    };
    let now = Instant::now();

    if ctx.session.is_locked_out(now) {
        return negative(0x27, NRC_EXCEEDED_NUMBER_OF_ATTEMPTS);
    }

    if is_request_seed(sub) {
        let seed = if ctx.session.security_level() > 0 {
            0
        } else {
            ctx.session.next_seed()
        };
        ctx.session.set_outstanding_seed(seed);
        let bytes = seed.to_be_bytes();
        vec![0x67, sub, bytes[0], bytes[1], bytes[2], bytes[3]]
    } else {
        let Some(seed) = ctx.session.take_outstanding_seed() else {
            return negative(0x27, NRC_INVALID_KEY);
        };
        let key_bytes = &request[2..];
        if key_bytes.len() != 4 {
            return negative(0x27, NRC_INVALID_KEY);
        }
        let expected = (seed ^ LEVEL_1_MASK).to_be_bytes();
        if key_bytes == expected {
            ctx.session.unlock(1);
            vec![0x67, sub]
        } else if ctx.session.record_wrong_key(now) {
            negative(0x27, NRC_EXCEEDED_NUMBER_OF_ATTEMPTS)
        } else {
            negative(0x27, NRC_INVALID_KEY)
        }
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
    fn correct_key_unlocks_level_one() {
        let mut session = UdsSession::new(7);
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

        let seed_resp = handle(&[0x27, 0x01], &mut ctx);
        assert_eq!(seed_resp[0], 0x67);
        let seed = u32::from_be_bytes([seed_resp[2], seed_resp[3], seed_resp[4], seed_resp[5]]);
        let key = (seed ^ LEVEL_1_MASK).to_be_bytes();
        let key_resp = handle(
            &[0x27, 0x02, key[0], key[1], key[2], key[3]],
            &mut ctx,
        );
        assert_eq!(key_resp, vec![0x67, 0x02]);
        assert_eq!(ctx.session.security_level(), 1);
    }

    #[test]
    fn three_wrong_keys_then_lockout() {
        let mut session = UdsSession::new(7);
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

        for _ in 0..3 {
            handle(&[0x27, 0x01], &mut ctx);
            let resp = handle(&[0x27, 0x02, 0, 0, 0, 0], &mut ctx);
            assert_eq!(resp, negative(0x27, NRC_INVALID_KEY));
        }
        handle(&[0x27, 0x01], &mut ctx);
        let resp = handle(&[0x27, 0x02, 0, 0, 0, 0], &mut ctx);
        assert_eq!(resp, negative(0x27, NRC_EXCEEDED_NUMBER_OF_ATTEMPTS));
    }
}
