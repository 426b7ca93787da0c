//! `0x19` ReadDTCInformation.

use super::{negative, UdsContext, NRC_REQUEST_OUT_OF_RANGE, NRC_SUBFUNCTION_NOT_SUPPORTED};
use crate::dtc::DtcManager;

const SUB_NUMBER_BY_STATUS_MASK: u8 = 0x01;
const SUB_BY_STATUS_MASK: u8 = 0x02;
const SUB_BY_DTC: u8 = 0x04;
const SUB_SUPPORTED_DTCS: u8 = 0x0A;

pub(super) fn handle(request: &[u8], ctx: &mut UdsContext<'_>) -> Vec<u8> {
    let Some(&sub) = request.get(1) else {
        return negative(0x19, NRC_SUBFUNCTION_NOT_SUPPORTED);
    };
    match sub {
        SUB_NUMBER_BY_STATUS_MASK => {
            let Some(&mask) = request.get(2) else {
                return negative(0x19, NRC_REQUEST_OUT_OF_RANGE);
            };
            let count = ctx
                .dtc
                .all()
                .filter(|r| DtcManager::status_byte(r) & mask != 0)
                .count();
            vec![0x59, sub, 0xFF, 0x00, count as u8]
        }
        SUB_BY_STATUS_MASK => {
            let Some(&mask) = request.get(2) else {
                return negative(0x19, NRC_REQUEST_OUT_OF_RANGE);
            };
            let mut response = vec![0x59, sub, 0xFF];
            for rec in ctx.dtc.all() {
                let status = DtcManager::status_byte(rec);
                if status & mask != 0 {
                    response.extend_from_slice(&rec.code.to_bytes());
                    response.push(status);
                }
            }
            response
        }
        SUB_BY_DTC => {
            if request.len() < 5 {
                return negative(0x19, NRC_REQUEST_OUT_OF_RANGE);
            }
            let code_bytes = [request[2], request[3]];
            let code = crate::dtc::DtcCode::from_bytes(code_bytes);
            let Some(rec) = ctx.dtc.get(code) else {
                return negative(0x19, NRC_REQUEST_OUT_OF_RANGE);
            };
            let mut response = vec![0x59, sub, request[2], request[3], DtcManager::status_byte(rec)];
            if let Some(snap) = rec.freeze_frame {
                response.push(0x01);
                response.push(0x0C);
                let raw = snap.rpm as u32 * 4;
                response.push((raw >> 8) as u8);
                response.push(raw as u8);
            } else {
                response.push(0x00);
            }
            response
        }
        SUB_SUPPORTED_DTCS => {
            let mut response = vec![0x59, sub, 0xFF];
            for rec in ctx.dtc.all() {
                response.extend_from_slice(&rec.code.to_bytes());
                response.push(DtcManager::status_byte(rec));
            }
            response
        }
        _ => negative(0x19, NRC_SUBFUNCTION_NOT_SUPPORTED),
    }
}
