//! `0x22` ReadDataByIdentifier.

use super::{negative, UdsContext, DID_ASSET_TAG, NRC_REQUEST_OUT_OF_RANGE};

/// VIN.
const DID_VIN: u16 = 0xF190;
/// ECU part number (ASCII, manufacturer-defined length here: 10).
const DID_PART_NUMBER: u16 = 0xF187;
/// Manufacturer-reserved DID exposing live coolant temperature, °C + 40.
const DID_COOLANT_TEMP: u16 = 0x1101;
/// Manufacturer-reserved DID exposing live battery voltage in centivolts.
const DID_BATTERY_VOLTAGE: u16 = 0x1102;

pub(super) fn handle(request: &[u8], ctx: &mut UdsContext<'_>) -> Vec<u8> {
    if request.len() < 3 || (request.len() - 1) % 2 != 0 {
        return negative(0x22, NRC_REQUEST_OUT_OF_RANGE);
    }
    let mut response = vec![0x62];
    for pair in request[1..].chunks_exact(2) {
        let did = u16::from_be_bytes([pair[0], pair[1]]);
        match read_did(did, ctx) {
            Some(data) => {
                response.extend_from_slice(&did.to_be_bytes());
                response.extend_from_slice(&data);
            }
            None => return negative(0x22, NRC_REQUEST_OUT_OF_RANGE),
        }
    }
    response
}

fn read_did(did: u16, ctx: &mut UdsContext<'_>) -> Option<Vec<u8>> {
    match did {
        DID_VIN => Some(ctx.vin.as_bytes().to_vec()),
        DID_PART_NUMBER => Some(b"SIM0001234".to_vec()),
        DID_COOLANT_TEMP => {
            let snap = ctx.vehicle.lock().unwrap().snapshot();
            Some(vec![(snap.coolant_temp + 40) as u8])
        }
        DID_BATTERY_VOLTAGE => {
            let snap = ctx.vehicle.lock().unwrap().snapshot();
            let centivolts = (snap.battery_v * 100.0).round() as u16;
            Some(centivolts.to_be_bytes().to_vec())
        }
        DID_ASSET_TAG => Some(ctx.asset_tag.clone().unwrap_or_default()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::session::DiagnosticSession;
    use super::super::write_data_by_identifier;
    use crate::dtc::DtcManager;
    use crate::uds::{RoutineRegistry, UdsSession};
    use crate::vehicle::{ReadinessSet, VehicleSimulator};
    use std::sync::{Arc, Mutex};

    #[test]
    fn asset_tag_reads_back_empty_until_written_then_reads_back_written_bytes() {
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
        let before = handle(&[0x22, did[0], did[1]], &mut ctx);
        assert_eq!(before, vec![0x62, did[0], did[1]]);

        write_data_by_identifier::handle(&[0x2E, did[0], did[1], b'B', b'A', b'Y', b'2'], &mut ctx);

        let after = handle(&[0x22, did[0], did[1]], &mut ctx);
        assert_eq!(after, [vec![0x62, did[0], did[1]], b"BAY2".to_vec()].concat());
    }
}
