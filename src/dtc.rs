//! Diagnostic trouble codes: the per-ECU fault record set, its lifecycle
//! state machine, and freeze-frame capture.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::error::{SimError, SimResult};
use crate::vehicle::Snapshot;

/// DTC category, encoded in the top two bits of the canonical 2-byte form.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DtcCategory {
    /// `P0` / `P1` -- powertrain.
    Powertrain,
    /// `C0` -- chassis.
    Chassis,
    /// `B0` -- body.
    Body,
    /// `U0` -- network.
    Network,
}

impl DtcCategory {
    /// The two-bit category field used in the OBD-II wire encoding.
    fn category_bits(self) -> u8 {
        match self {
            DtcCategory::Powertrain => 0b00,
            DtcCategory::Chassis => 0b01,
            DtcCategory::Body => 0b10,
            DtcCategory::Network => 0b11,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => DtcCategory::Powertrain,
            0b01 => DtcCategory::Chassis,
            0b10 => DtcCategory::Body,
            _ => DtcCategory::Network,
        }
    }

    fn letter(self) -> char {
        match self {
            DtcCategory::Powertrain => 'P',
            DtcCategory::Chassis => 'C',
            DtcCategory::Body => 'B',
            DtcCategory::Network => 'U',
        }
    }
}

/// Lifecycle state of a DTC.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DtcState {
    /// Failure observed, but not yet confirmed across enough operation
    /// cycles.
    Pending,
    /// Failure confirmed; contributes to the MIL if `mil_illuminate` is set.
    Confirmed,
    /// Confirmed historically; survives a `clear_dtcs` call and is only
    /// removed once the underlying condition has not recurred for the
    /// manufacturer-defined number of cycles (not modeled further here).
    Permanent,
}

/// A canonical 5-character DTC code, e.g. `P0420`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DtcCode {
    category: DtcCategory,
    /// The four decimal digits following the category letter, 0..=3999 --
    /// the first digit is restricted to 0..=3 by the wire encoding (it
    /// occupies a 2-bit field alongside the category), the rest 0..=9.
    digits: u16,
}

impl DtcCode {
    /// Parses a canonical code such as `"P0420"`.
    pub fn parse(code: &str) -> SimResult<Self> {
        let bytes = code.as_bytes();
        if bytes.len() != 5 {
            return Err(SimError::CodeInvalid(code.to_string()));
        }
        let category = match bytes[0] {
            b'P' => DtcCategory::Powertrain,
            b'C' => DtcCategory::Chassis,
            b'B' => DtcCategory::Body,
            b'U' => DtcCategory::Network,
            _ => return Err(SimError::CodeInvalid(code.to_string())),
        };
        if !bytes[1..].iter().all(u8::is_ascii_digit) {
            return Err(SimError::CodeInvalid(code.to_string()));
        }
        let digits: u16 = code[1..]
            .parse()
            .map_err(|_| SimError::CodeInvalid(code.to_string()))?;
        if digits / 1000 > 3 {
            return Err(SimError::CodeInvalid(code.to_string()));
        }
        Ok(Self { category, digits })
    }

    /// Encodes as the canonical 2-byte OBD-II wire form: category and the
    /// first two digits (first digit 2 bits, second digit a full nibble)
    /// pack the high byte; the last two digits each take a nibble of the
    /// low byte. E.g. `P0420` -> `0x04 0x20`.
    pub fn to_bytes(self) -> [u8; 2] {
        let d1 = (self.digits / 1000 % 10) as u8;
        let d2 = (self.digits / 100 % 10) as u8;
        let d3 = (self.digits / 10 % 10) as u8;
        let d4 = (self.digits % 10) as u8;
        let high = (self.category.category_bits() << 6) | (d1 << 4) | d2;
        let low = (d3 << 4) | d4;
        [high, low]
    }

    /// Decodes from the canonical 2-byte wire form.
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        let category = DtcCategory::from_bits(bytes[0] >> 6);
        let d1 = ((bytes[0] >> 4) & 0x03) as u16;
        let d2 = (bytes[0] & 0x0F) as u16;
        let d3 = ((bytes[1] >> 4) & 0x0F) as u16;
        let d4 = (bytes[1] & 0x0F) as u16;
        let digits = d1 * 1000 + d2 * 100 + d3 * 10 + d4;
        Self { category, digits }
    }
}

impl std::fmt::Display for DtcCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:04}", self.category.letter(), self.digits)
    }
}

/// A single diagnostic trouble code record.
#[derive(Debug, Clone)]
pub struct DtcRecord {
    /// The canonical code, e.g. `P0420`.
    pub code: DtcCode,
    /// Human-readable description.
    pub description: String,
    /// Current lifecycle state.
    pub state: DtcState,
    /// Number of times this code's trigger condition has fired.
    pub occurrence_count: u32,
    /// Sensor snapshot captured when this code first went PENDING, if any.
    pub freeze_frame: Option<Snapshot>,
    /// Whether this code illuminates the MIL once CONFIRMED.
    pub mil_illuminate: bool,
    /// Whether this code is emissions-related (relevant to Mode 07/0A and
    /// UDS `ReadDTCInformation` emissions-only sub-functions).
    pub emission_related: bool,
    /// Wall-clock time this code was first observed.
    pub first_seen: Instant,
    /// Number of operation cycles since the code first went PENDING.
    cycles_pending: u32,
}

bitflags::bitflags! {
    /// ISO 14229 `ReadDTCInformation` status byte bits.
    #[derive(Debug, Copy, Clone, Default)]
    pub struct DtcStatusByte: u8 {
        const TEST_FAILED = 1 << 0;
        const TEST_FAILED_THIS_CYCLE = 1 << 1;
        const PENDING = 1 << 2;
        const CONFIRMED = 1 << 3;
        const TEST_NOT_COMPLETED_SINCE_CLEAR = 1 << 4;
        const TEST_FAILED_SINCE_CLEAR = 1 << 5;
        const TEST_NOT_COMPLETED_THIS_CYCLE = 1 << 6;
        const WARNING_INDICATOR = 1 << 7;
    }
}

impl DtcStatusByte {
    fn from_record(rec: &DtcRecord) -> Self {
        let mut bits = match rec.state {
            DtcState::Pending => Self::PENDING | Self::TEST_FAILED_THIS_CYCLE,
            DtcState::Confirmed | DtcState::Permanent => {
                Self::CONFIRMED | Self::TEST_FAILED | Self::TEST_FAILED_SINCE_CLEAR
            }
        };
        if rec.mil_illuminate && matches!(rec.state, DtcState::Confirmed | DtcState::Permanent) {
            bits |= Self::WARNING_INDICATOR;
        }
        bits
    }
}

/// Number of consecutive operation cycles a code must report its failure
/// before it is promoted from PENDING to CONFIRMED.
pub const CYCLES_TO_CONFIRM: u32 = 2;

/// Per-ECU diagnostic trouble code set and lifecycle state machine.
#[derive(Debug, Default)]
pub struct DtcManager {
    records: BTreeMap<DtcCode, DtcRecord>,
    storage_enabled: bool,
}

impl DtcManager {
    /// Creates an empty manager with new-DTC storage enabled.
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            storage_enabled: true,
        }
    }

    /// Enables or disables storing newly triggered DTCs, per UDS
    /// `ControlDTCSetting` (`0x85`). Existing DTCs are unaffected.
    pub fn set_storage_enabled(&mut self, enabled: bool) {
        self.storage_enabled = enabled;
    }

    /// Directly injects a DTC as CONFIRMED (used by the control surface's
    /// `inject_dtc`), optionally capturing a freeze frame.
    pub fn inject(
        &mut self,
        code: DtcCode,
        description: impl Into<String>,
        mil_illuminate: bool,
        emission_related: bool,
        freeze: Option<Snapshot>,
    ) {
        let rec = self.records.entry(code).or_insert_with(|| DtcRecord {
            code,
            description: description.into(),
            state: DtcState::Pending,
            occurrence_count: 0,
            freeze_frame: None,
            mil_illuminate,
            emission_related,
            first_seen: Instant::now(),
            cycles_pending: 0,
        });
        rec.occurrence_count += 1;
        rec.state = DtcState::Confirmed;
        if rec.freeze_frame.is_none() {
            rec.freeze_frame = freeze;
        }
    }

    /// Evaluates one trigger firing for `code` during a simulator tick.
    /// First firing creates a PENDING record (and, if `first_pending_freeze`
    /// is `Some`, captures the freeze frame); subsequent ticks advance the
    /// pending-cycle counter and promote to CONFIRMED after
    /// [`CYCLES_TO_CONFIRM`] cycles.
    pub fn trigger(
        &mut self,
        code: DtcCode,
        description: impl Into<String>,
        mil_illuminate: bool,
        emission_related: bool,
        first_pending_freeze: Option<Snapshot>,
    ) {
        if !self.storage_enabled && !self.records.contains_key(&code) {
            return;
        }
        let rec = self.records.entry(code).or_insert_with(|| DtcRecord {
            code,
            description: description.into(),
            state: DtcState::Pending,
            occurrence_count: 0,
            freeze_frame: None,
            mil_illuminate,
            emission_related,
            first_seen: Instant::now(),
            cycles_pending: 0,
        });
        rec.occurrence_count += 1;
        if rec.freeze_frame.is_none() {
            rec.freeze_frame = first_pending_freeze;
        }
        if rec.state == DtcState::Pending {
            rec.cycles_pending += 1;
            if rec.cycles_pending >= CYCLES_TO_CONFIRM {
                rec.state = DtcState::Confirmed;
            }
        }
    }

    /// Clears all non-permanent DTCs. A CONFIRMED code that illuminates the
    /// MIL is promoted to PERMANENT rather than discarded -- a real ECU
    /// will not let a clear erase the record of an active emissions fault
    /// -- and survives; every other CONFIRMED or PENDING code is dropped.
    /// Permanent DTCs already present are untouched.
    pub fn clear(&mut self) {
        for rec in self.records.values_mut() {
            if rec.state == DtcState::Confirmed && rec.mil_illuminate {
                rec.state = DtcState::Permanent;
            }
        }
        self.records.retain(|_, rec| rec.state == DtcState::Permanent);
    }

    /// `true` once at least one CONFIRMED or PERMANENT DTC has
    /// `mil_illuminate` set -- the condition that turns on the Malfunction
    /// Indicator Lamp. PERMANENT counts too: Mode 04 only "turns MIL off if
    /// no permanent DTC remains" (§4.2), i.e. a clear that promotes an
    /// active fault to PERMANENT must not extinguish the lamp.
    pub fn mil_on(&self) -> bool {
        self.records
            .values()
            .any(|r| matches!(r.state, DtcState::Confirmed | DtcState::Permanent) && r.mil_illuminate)
    }

    /// Number of CONFIRMED DTCs (used by Mode 01 PID 01's DTC count field).
    pub fn confirmed_count(&self) -> u8 {
        self.records
            .values()
            .filter(|r| r.state == DtcState::Confirmed)
            .count() as u8
    }

    /// All records, regardless of state.
    pub fn all(&self) -> impl Iterator<Item = &DtcRecord> {
        self.records.values()
    }

    /// Records matching `state`.
    pub fn by_state(&self, state: DtcState) -> Vec<&DtcRecord> {
        self.records.values().filter(|r| r.state == state).collect()
    }

    /// Looks up a single record.
    pub fn get(&self, code: DtcCode) -> Option<&DtcRecord> {
        self.records.get(&code)
    }

    /// Formats the ISO 14229 status byte for `rec`.
    pub fn status_byte(rec: &DtcRecord) -> u8 {
        DtcStatusByte::from_record(rec).0
    }
}

/// Minimum wall-clock time an injected code remains in PENDING before it is
/// eligible for promotion on the next tick, when driven by the tick loop
/// rather than `inject_dtc`.
pub const MIN_PENDING_DURATION: Duration = Duration::from_millis(0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_roundtrips_through_wire_encoding() {
        let code = DtcCode::parse("P0420").unwrap();
        let bytes = code.to_bytes();
        let back = DtcCode::from_bytes(bytes);
        assert_eq!(code, back);
        assert_eq!(code.to_string(), "P0420");
    }

    #[test]
    fn p0420_encodes_to_the_documented_wire_bytes() {
        // Catalyst efficiency below threshold -- the canonical example used
        // throughout ISO/SAE documentation and this crate's own end-to-end
        // walkthrough.
        let code = DtcCode::parse("P0420").unwrap();
        assert_eq!(code.to_bytes(), [0x04, 0x20]);
    }

    #[test]
    fn nonzero_leading_digit_roundtrips() {
        for raw in ["P1000", "C0300", "B2187", "U3000"] {
            let code = DtcCode::parse(raw).unwrap();
            let back = DtcCode::from_bytes(code.to_bytes());
            assert_eq!(code, back, "mismatch for {raw}");
            assert_eq!(code.to_string(), raw);
        }
    }

    #[test]
    fn rejects_malformed_codes() {
        assert!(DtcCode::parse("P042").is_err());
        assert!(DtcCode::parse("X0420").is_err());
        assert!(DtcCode::parse("P04AB").is_err());
        assert!(DtcCode::parse("P4000").is_err());
    }

    #[test]
    fn trigger_promotes_after_confirm_cycles() {
        let mut mgr = DtcManager::new();
        let code = DtcCode::parse("P0420").unwrap();
        mgr.trigger(code, "Catalyst efficiency below threshold", true, true, None);
        assert_eq!(mgr.get(code).unwrap().state, DtcState::Pending);
        mgr.trigger(code, "Catalyst efficiency below threshold", true, true, None);
        assert_eq!(mgr.get(code).unwrap().state, DtcState::Confirmed);
        assert!(mgr.mil_on());
    }

    #[test]
    fn clear_promotes_confirmed_mil_on_code_to_permanent_and_drops_the_rest() {
        let mut mgr = DtcManager::new();
        // mil_illuminate=true, CONFIRMED: must survive the clear, promoted
        // to PERMANENT rather than discarded.
        let code = DtcCode::parse("P0300").unwrap();
        mgr.inject(code, "Random misfire detected", true, true, None);
        // mil_illuminate=false, CONFIRMED: no active emissions fault, must
        // be dropped like any other non-permanent code.
        let code2 = DtcCode::parse("P0171").unwrap();
        mgr.inject(code2, "System too lean", false, true, None);

        mgr.clear();
        assert_eq!(mgr.get(code).unwrap().state, DtcState::Permanent);
        assert!(mgr.get(code2).is_none());
        assert!(mgr.mil_on(), "a promoted PERMANENT mil-on code keeps the MIL lit");

        // Clearing again is idempotent: the PERMANENT record is untouched.
        mgr.clear();
        assert_eq!(mgr.get(code).unwrap().state, DtcState::Permanent);
    }

    #[test]
    fn storage_disabled_blocks_new_codes_but_not_existing() {
        let mut mgr = DtcManager::new();
        let code = DtcCode::parse("P0420").unwrap();
        mgr.trigger(code, "d", true, true, None);
        mgr.set_storage_enabled(false);
        let new_code = DtcCode::parse("P0171").unwrap();
        mgr.trigger(new_code, "d2", true, true, None);
        assert!(mgr.get(new_code).is_none());
        mgr.trigger(code, "d", true, true, None);
        assert_eq!(mgr.get(code).unwrap().state, DtcState::Confirmed);
    }
}
