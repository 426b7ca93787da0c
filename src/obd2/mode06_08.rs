//! Modes 06 / 08: on-board monitoring test results and request control of
//! on-board systems. Neither is backed by simulated data; reproduce the
//! response shape with an empty/stub payload rather than fabricate test
//! results this simulator has no physical basis for.

pub(super) fn handle(mode: u8, request: &[u8]) -> Vec<u8> {
    let echo = request.get(1).copied().unwrap_or(0x00);
    vec![mode | 0x40, echo]
}
