//! UDS (ISO 14229) service handlers (`0x10..=0x85`).
//!
//! Each handler is a stateful function of one ECU's [`UdsSession`], DTC
//! manager, and vehicle simulator handle. Positive responses echo the
//! service byte OR `0x40`; negative responses are `0x7F <service> <NRC>`.

mod clear_diagnostic_information;
mod control_dtc_setting;
mod diagnostic_session_control;
mod io_control;
mod read_data_by_identifier;
mod read_dtc_information;
mod routine_control;
pub mod security_access;
mod session;
mod tester_present;
mod write_data_by_identifier;

pub use routine_control::RoutineRegistry;
pub use session::{DiagnosticSession, UdsSession};

use std::sync::{Arc, Mutex};

use crate::dtc::DtcManager;
use crate::vehicle::{ReadinessSet, VehicleSimulator};

/// `serviceNotSupported`.
pub const NRC_SERVICE_NOT_SUPPORTED: u8 = 0x11;
/// `subFunctionNotSupported`.
pub const NRC_SUBFUNCTION_NOT_SUPPORTED: u8 = 0x12;
/// `incorrectMessageLengthOrInvalidFormat`.
pub const NRC_INCORRECT_MESSAGE_LENGTH: u8 = 0x13;
/// `busyRepeatRequest`.
pub const NRC_BUSY_REPEAT_REQUEST: u8 = 0x21;
/// `conditionsNotCorrect`.
pub const NRC_CONDITIONS_NOT_CORRECT: u8 = 0x22;
/// `requestOutOfRange`.
pub const NRC_REQUEST_OUT_OF_RANGE: u8 = 0x31;
/// `securityAccessDenied`.
pub const NRC_SECURITY_ACCESS_DENIED: u8 = 0x33;
/// `invalidKey`.
pub const NRC_INVALID_KEY: u8 = 0x35;
/// `exceededNumberOfAttempts`.
pub const NRC_EXCEEDED_NUMBER_OF_ATTEMPTS: u8 = 0x36;
/// `subFunctionNotSupportedInActiveSession`.
pub const NRC_SUBFUNCTION_NOT_SUPPORTED_IN_SESSION: u8 = 0x7E;
/// `serviceNotSupportedInActiveSession`.
pub const NRC_SERVICE_NOT_SUPPORTED_IN_SESSION: u8 = 0x7F;

/// The only writable DID in this simulator: an informational free-text
/// asset tag, gated behind security level 1. Shared between
/// `write_data_by_identifier` (which stores it) and
/// `read_data_by_identifier` (which reads it back).
pub(crate) const DID_ASSET_TAG: u16 = 0x1110;

/// Builds a `0x7F <service> <nrc>` negative response.
pub(crate) fn negative(service: u8, nrc: u8) -> Vec<u8> {
    vec![0x7F, service, nrc]
}

/// Everything a UDS handler needs: the ECU's own session/security state,
/// its DTC manager and readiness monitors, and a handle to the shared
/// vehicle simulator (locked for the duration of the call only).
pub struct UdsContext<'a> {
    pub session: &'a mut UdsSession,
    pub dtc: &'a mut DtcManager,
    pub readiness: &'a mut ReadinessSet,
    pub vehicle: &'a Arc<Mutex<VehicleSimulator>>,
    pub vin: &'a str,
    pub routines: &'a mut RoutineRegistry,
    /// The ECU's writable asset-tag DID (`0x1110`), `None` until a
    /// `WriteDataByIdentifier` request has stored one.
    pub asset_tag: &'a mut Option<Vec<u8>>,
}

/// Dispatches a reassembled UDS request (service byte first) to its
/// handler. A session whose P2*/tester-present window has elapsed since the
/// last request is reverted to `Default` (and security re-locked) before
/// dispatch, per the session-timeout rule.
pub fn dispatch(request: &[u8], ctx: &mut UdsContext<'_>) -> Vec<u8> {
    let now = std::time::Instant::now();
    if ctx.session.is_expired(now) {
        log::info!("UDS session expired, reverting to default and re-locking security");
        ctx.session.revert_to_default();
    }
    let Some(&service) = request.first() else {
        return negative(0x00, NRC_SERVICE_NOT_SUPPORTED);
    };
    if ctx.session.current() != DiagnosticSession::Default {
        ctx.session.refresh_activity();
    }
    match service {
        0x10 => diagnostic_session_control::handle(request, ctx),
        0x14 => clear_diagnostic_information::handle(request, ctx),
        0x19 => read_dtc_information::handle(request, ctx),
        0x22 => read_data_by_identifier::handle(request, ctx),
        0x27 => security_access::handle(request, ctx),
        0x2E => write_data_by_identifier::handle(request, ctx),
        0x2F => io_control::handle(request, ctx),
        0x31 => routine_control::handle(request, ctx),
        0x3E => tester_present::handle(request, ctx),
        0x85 => control_dtc_setting::handle(request, ctx),
        _ => negative(service, NRC_SERVICE_NOT_SUPPORTED),
    }
}
