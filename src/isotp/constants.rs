//! PCI (protocol control information) nibble values and ISO-TP timing
//! constants, per ISO 15765-2.

use std::time::Duration;

/// Single Frame PCI type.
pub const PCI_SINGLE_FRAME: u8 = 0x0;
/// First Frame PCI type.
pub const PCI_FIRST_FRAME: u8 = 0x1;
/// Consecutive Frame PCI type.
pub const PCI_CONSECUTIVE_FRAME: u8 = 0x2;
/// Flow Control PCI type.
pub const PCI_FLOW_CONTROL: u8 = 0x3;

/// Flow control flag: clear to send.
pub const FC_FLAG_CTS: u8 = 0x0;
/// Flow control flag: wait.
pub const FC_FLAG_WAIT: u8 = 0x1;
/// Flow control flag: overflow, abort the transfer.
pub const FC_FLAG_OVERFLOW: u8 = 0x2;

/// Largest payload a Single Frame can carry.
pub const MAX_SINGLE_FRAME_LEN: usize = 7;
/// Largest payload ISO-TP as specified here can transport.
pub const MAX_ISOTP_PAYLOAD_LEN: usize = 4095;
/// Payload bytes carried by a First Frame.
pub const FIRST_FRAME_DATA_LEN: usize = 6;
/// Payload bytes carried by a Consecutive Frame.
pub const CONSECUTIVE_FRAME_DATA_LEN: usize = 7;

/// N_Bs: sender's timeout waiting for a Flow Control frame.
pub const N_BS_TIMEOUT: Duration = Duration::from_millis(1000);
/// N_Cr: receiver's timeout waiting for the next Consecutive Frame.
pub const N_CR_TIMEOUT: Duration = Duration::from_millis(1000);
/// N_As / N_Ar: implementation-defined single-frame-send timeout, generous
/// for a virtual bus with no arbitration delay.
pub const N_AS_TIMEOUT: Duration = Duration::from_millis(100);

/// Default number of consecutive FC=WAIT frames tolerated before a send
/// transfer gives up.
pub const DEFAULT_MAX_WAIT_FRAMES: u32 = 10;

/// Converts a raw STmin byte to a sleep duration, per the edge-case rules
/// in the design: `0x00..=0x7F` are milliseconds, `0xF1..=0xF9` are
/// 100..900 microseconds, anything else is reserved and treated as zero.
pub fn st_min_to_duration(raw: u8) -> Duration {
    match raw {
        0x00..=0x7F => Duration::from_millis(raw as u64),
        0xF1..=0xF9 => Duration::from_micros((raw as u64 - 0xF0) * 100),
        _ => Duration::from_millis(0),
    }
}
