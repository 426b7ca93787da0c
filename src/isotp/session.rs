//! ISO-TP (ISO 15765-2) segmentation, reassembly and flow control for a
//! single address pair.
//!
//! One [`IsoTpSession`] binds one peer relationship: a set of arbitration
//! IDs it accepts frames from (its own request ID, plus the functional
//! broadcast ID when applicable) and the ID it transmits under (its
//! response ID). Exactly one inbound and one outbound transfer may be in
//! flight at a time, matching the design.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::can::{CanFrame, CanTransceiver};

use super::constants::*;
use super::error::IsoTpError;

/// Depth of the queue holding inbound frames that arrive while an outbound
/// transfer is waiting on Flow Control.
pub const PENDING_QUEUE_DEPTH: usize = 4;

/// Outcome of feeding one frame into the receiver side of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsoTpEvent {
    /// A complete payload was reassembled.
    Complete(Vec<u8>),
    /// The frame was consumed but reassembly isn't finished yet.
    Pending,
    /// The frame was not applicable to this session (wrong peer, bad PCI,
    /// or a protocol error) and was silently discarded, as the standard
    /// requires.
    Discarded,
}

#[derive(Debug, Default)]
struct ReceiverState {
    in_progress: bool,
    total_len: usize,
    buffer: Vec<u8>,
    next_seq: u8,
    /// Wall-clock time the last First Frame or Consecutive Frame was
    /// accepted. Used to enforce N_Cr: if the next Consecutive Frame
    /// doesn't arrive within the timeout, the transfer is discarded.
    last_activity: Option<Instant>,
}

/// A single ISO-TP session bound to one ECU address pair.
pub struct IsoTpSession {
    channel: Box<dyn CanTransceiver>,
    tx_id: u16,
    peer_ids: Vec<u16>,
    max_wait_frames: u32,
    receiver: ReceiverState,
    pending: VecDeque<CanFrame>,
}

impl IsoTpSession {
    /// Creates a session that transmits under `tx_id` and accepts inbound
    /// frames whose arbitration ID is in `peer_ids` (normally the client's
    /// request ID, plus the functional broadcast ID).
    pub fn new(channel: Box<dyn CanTransceiver>, tx_id: u16, peer_ids: Vec<u16>) -> Self {
        Self {
            channel,
            tx_id,
            peer_ids,
            max_wait_frames: DEFAULT_MAX_WAIT_FRAMES,
            receiver: ReceiverState::default(),
            pending: VecDeque::new(),
        }
    }

    /// The arbitration ID this session transmits under.
    pub fn tx_id(&self) -> u16 {
        self.tx_id
    }

    /// Pops the oldest queued inbound frame that arrived while this session
    /// was busy sending a response, if any.
    pub fn take_pending(&mut self) -> Option<CanFrame> {
        self.pending.pop_front()
    }

    fn push_pending(&mut self, frame: CanFrame) {
        if self.pending.len() >= PENDING_QUEUE_DEPTH {
            warn!(
                "ISO-TP session 0x{:03X}: pending queue full, dropping frame from 0x{:03X}",
                self.tx_id,
                frame.id()
            );
            return;
        }
        self.pending.push_back(frame);
    }

    /// Cancels any in-progress inbound reassembly and drops queued frames.
    /// Used on ignition-off / shutdown teardown.
    pub fn reset(&mut self) {
        if self.receiver.in_progress {
            debug!(
                "ISO-TP session 0x{:03X}: cancelling in-progress inbound transfer",
                self.tx_id
            );
        }
        self.receiver = ReceiverState::default();
        self.pending.clear();
    }

    /// Feeds one inbound frame into the receiver state machine. A frame
    /// whose arbitration ID is not one of `peer_ids` is silently discarded.
    pub fn handle_inbound(&mut self, frame: &CanFrame) -> IsoTpEvent {
        if !self.peer_ids.contains(&frame.id()) {
            return IsoTpEvent::Discarded;
        }
        let data = frame.data();
        let Some(&pci_byte) = data.first() else {
            return IsoTpEvent::Discarded;
        };
        match pci_byte >> 4 {
            PCI_SINGLE_FRAME => self.handle_single_frame(data),
            PCI_FIRST_FRAME => self.handle_first_frame(data),
            PCI_CONSECUTIVE_FRAME => self.handle_consecutive_frame(data),
            PCI_FLOW_CONTROL => {
                debug!("ISO-TP session 0x{:03X}: unexpected FC on receive side", self.tx_id);
                IsoTpEvent::Discarded
            }
            other => {
                error!("ISO-TP session 0x{:03X}: unknown PCI nibble 0x{other:X}", self.tx_id);
                IsoTpEvent::Discarded
            }
        }
    }

    fn handle_single_frame(&mut self, data: &[u8]) -> IsoTpEvent {
        let len = (data[0] & 0x0F) as usize;
        if len == 0 {
            error!("ISO-TP session 0x{:03X}: single frame declared zero length", self.tx_id);
            return IsoTpEvent::Discarded;
        }
        if len > MAX_SINGLE_FRAME_LEN || data.len() < 1 + len {
            error!("ISO-TP session 0x{:03X}: single frame length {len} invalid", self.tx_id);
            return IsoTpEvent::Discarded;
        }
        self.receiver = ReceiverState::default();
        IsoTpEvent::Complete(data[1..1 + len].to_vec())
    }

    fn handle_first_frame(&mut self, data: &[u8]) -> IsoTpEvent {
        if data.len() < 2 {
            return IsoTpEvent::Discarded;
        }
        let total_len = (((data[0] & 0x0F) as usize) << 8) | data[1] as usize;
        if !(8..=MAX_ISOTP_PAYLOAD_LEN).contains(&total_len) {
            error!("ISO-TP session 0x{:03X}: first frame total length {total_len} invalid", self.tx_id);
            return IsoTpEvent::Discarded;
        }
        if self.receiver.in_progress {
            warn!(
                "ISO-TP session 0x{:03X}: new First Frame replaces in-progress inbound transfer ({} of {} bytes)",
                self.tx_id,
                self.receiver.buffer.len(),
                self.receiver.total_len
            );
        }
        let available = data.len().saturating_sub(2).min(FIRST_FRAME_DATA_LEN).min(total_len);
        self.receiver = ReceiverState {
            in_progress: true,
            total_len,
            buffer: data[2..2 + available].to_vec(),
            next_seq: 1,
            last_activity: Some(Instant::now()),
        };
        self.channel
            .send(CanFrame::new_padded(self.tx_id, &[PCI_FLOW_CONTROL << 4 | FC_FLAG_CTS, 0, 0]))
            .ok();
        IsoTpEvent::Pending
    }

    fn handle_consecutive_frame(&mut self, data: &[u8]) -> IsoTpEvent {
        if !self.receiver.in_progress {
            debug!("ISO-TP session 0x{:03X}: consecutive frame with no transfer in progress", self.tx_id);
            return IsoTpEvent::Discarded;
        }
        let seq = data[0] & 0x0F;
        if seq != self.receiver.next_seq {
            error!(
                "ISO-TP session 0x{:03X}: sequence mismatch, expected {} got {seq}",
                self.tx_id, self.receiver.next_seq
            );
            self.receiver = ReceiverState::default();
            return IsoTpEvent::Discarded;
        }
        let remaining = self.receiver.total_len - self.receiver.buffer.len();
        let take = remaining.min(data.len().saturating_sub(1)).min(CONSECUTIVE_FRAME_DATA_LEN);
        self.receiver.buffer.extend_from_slice(&data[1..1 + take]);
        self.receiver.next_seq = if self.receiver.next_seq == 15 { 0 } else { self.receiver.next_seq + 1 };
        self.receiver.last_activity = Some(Instant::now());
        if self.receiver.buffer.len() >= self.receiver.total_len {
            let payload = std::mem::take(&mut self.receiver.buffer);
            self.receiver = ReceiverState::default();
            IsoTpEvent::Complete(payload)
        } else {
            IsoTpEvent::Pending
        }
    }

    /// Segments and sends `payload`, running the full Flow Control
    /// handshake for multi-frame transfers. Blocks the calling thread while
    /// waiting on Flow Control; any inbound frame observed that isn't the
    /// Flow Control we're waiting for is queued via [`Self::take_pending`].
    pub fn send(&mut self, payload: &[u8]) -> Result<(), IsoTpError> {
        if payload.is_empty() || payload.len() > MAX_ISOTP_PAYLOAD_LEN {
            return Err(IsoTpError::PayloadLengthInvalid(payload.len()));
        }
        if payload.len() <= MAX_SINGLE_FRAME_LEN {
            let mut data = Vec::with_capacity(payload.len() + 1);
            data.push(PCI_SINGLE_FRAME << 4 | payload.len() as u8);
            data.extend_from_slice(payload);
            self.channel.send(CanFrame::new_padded(self.tx_id, &data))?;
            return Ok(());
        }

        let total = payload.len();
        let mut ff = Vec::with_capacity(FIRST_FRAME_DATA_LEN + 2);
        ff.push(PCI_FIRST_FRAME << 4 | ((total >> 8) as u8 & 0x0F));
        ff.push((total & 0xFF) as u8);
        ff.extend_from_slice(&payload[..FIRST_FRAME_DATA_LEN]);
        self.channel.send(CanFrame::new_padded(self.tx_id, &ff))?;

        let mut sent = FIRST_FRAME_DATA_LEN;
        let mut seq: u8 = 1;
        let mut waits = 0u32;

        while sent < total {
            let (block_size, st_min) = self.await_flow_control(&mut waits)?;
            let mut sent_in_block = 0u32;
            loop {
                if sent >= total {
                    break;
                }
                if block_size != 0 && sent_in_block >= block_size as u32 {
                    break;
                }
                let remaining = total - sent;
                let take = remaining.min(CONSECUTIVE_FRAME_DATA_LEN);
                let mut cf = Vec::with_capacity(take + 1);
                cf.push(PCI_CONSECUTIVE_FRAME << 4 | seq);
                cf.extend_from_slice(&payload[sent..sent + take]);
                self.channel.send(CanFrame::new_padded(self.tx_id, &cf))?;
                sent += take;
                seq = if seq == 15 { 0 } else { seq + 1 };
                sent_in_block += 1;
                if sent < total {
                    std::thread::sleep(st_min_to_duration(st_min));
                }
            }
        }
        Ok(())
    }

    fn await_flow_control(&mut self, waits: &mut u32) -> Result<(u8, u8), IsoTpError> {
        loop {
            let frame = self
                .channel
                .recv_timeout(N_BS_TIMEOUT)
                .map_err(|_| IsoTpError::FlowControlTimeout)?;
            if !self.peer_ids.contains(&frame.id()) {
                continue;
            }
            let data = frame.data();
            if data.is_empty() || data[0] >> 4 != PCI_FLOW_CONTROL {
                self.push_pending(frame);
                continue;
            }
            match data[0] & 0x0F {
                FC_FLAG_CTS => {
                    let bs = data.get(1).copied().unwrap_or(0);
                    let st_min = data.get(2).copied().unwrap_or(0);
                    return Ok((bs, st_min));
                }
                FC_FLAG_WAIT => {
                    *waits += 1;
                    if *waits > self.max_wait_frames {
                        return Err(IsoTpError::TooManyWaits);
                    }
                }
                FC_FLAG_OVERFLOW => return Err(IsoTpError::Overflow),
                _ => {}
            }
        }
    }

    /// Blocks for up to `timeout` waiting for the next raw frame from the
    /// channel, returning queued frames first. Used by the ECU actor's main
    /// loop. Checks N_Cr on every call so a stalled inbound transfer is
    /// discarded even if the peer never sends another frame at all.
    pub fn next_frame(&mut self, timeout: Duration) -> Option<CanFrame> {
        self.check_n_cr_timeout();
        if let Some(f) = self.take_pending() {
            return Some(f);
        }
        self.channel.recv_timeout(timeout).ok()
    }

    /// Discards the in-progress inbound transfer if N_Cr (the receiver's
    /// wait for the next Consecutive Frame) has expired.
    fn check_n_cr_timeout(&mut self) {
        if !self.receiver.in_progress {
            return;
        }
        let Some(last) = self.receiver.last_activity else {
            return;
        };
        if last.elapsed() >= N_CR_TIMEOUT {
            error!(
                "ISO-TP session 0x{:03X}: N_Cr expired, discarding {} of {} reassembled bytes",
                self.tx_id,
                self.receiver.buffer.len(),
                self.receiver.total_len
            );
            self.receiver = ReceiverState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can::CanError;
    use std::sync::mpsc;

    struct PairEnd {
        tx: mpsc::Sender<CanFrame>,
        rx: mpsc::Receiver<CanFrame>,
    }

    impl CanTransceiver for PairEnd {
        fn send(&self, frame: CanFrame) -> Result<(), CanError> {
            self.tx.send(frame).map_err(|_| CanError::Closed)
        }

        fn recv_timeout(&self, timeout: Duration) -> Result<CanFrame, CanError> {
            self.rx.recv_timeout(timeout).map_err(|_| CanError::Timeout)
        }
    }

    fn pair() -> (PairEnd, PairEnd) {
        let (tx_a, rx_a) = mpsc::channel();
        let (tx_b, rx_b) = mpsc::channel();
        (PairEnd { tx: tx_a, rx: rx_b }, PairEnd { tx: tx_b, rx: rx_a })
    }

    #[test]
    fn single_frame_roundtrip() {
        let (ecu_side, client_side) = pair();
        let mut ecu = IsoTpSession::new(Box::new(ecu_side), 0x7E8, vec![0x7E0]);
        let mut client = IsoTpSession::new(Box::new(client_side), 0x7E0, vec![0x7E8]);

        client.send(&[0x01, 0x0C]).unwrap();
        let frame = ecu.next_frame(Duration::from_millis(100)).unwrap();
        match ecu.handle_inbound(&frame) {
            IsoTpEvent::Complete(payload) => assert_eq!(payload, vec![0x01, 0x0C]),
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn multi_frame_roundtrip_100_bytes() {
        let (ecu_side, client_side) = pair();
        let mut ecu = IsoTpSession::new(Box::new(ecu_side), 0x7E8, vec![0x7E0]);
        let mut client = IsoTpSession::new(Box::new(client_side), 0x7E0, vec![0x7E8]);

        let payload: Vec<u8> = (0..100u16).map(|i| i as u8).collect();
        let payload_clone = payload.clone();
        let handle = std::thread::spawn(move || client.send(&payload_clone));

        let mut received = None;
        for _ in 0..32 {
            if let Some(frame) = ecu.next_frame(Duration::from_millis(500)) {
                if let IsoTpEvent::Complete(p) = ecu.handle_inbound(&frame) {
                    received = Some(p);
                    break;
                }
            }
        }
        handle.join().unwrap().unwrap();
        assert_eq!(received.unwrap(), payload);
    }

    #[test]
    fn single_frame_zero_length_is_discarded() {
        let (ecu_side, _client_side) = pair();
        let mut ecu = IsoTpSession::new(Box::new(ecu_side), 0x7E8, vec![0x7E0]);
        let frame = CanFrame::new_padded(0x7E0, &[0x00]);
        assert_eq!(ecu.handle_inbound(&frame), IsoTpEvent::Discarded);
    }

    #[test]
    fn frame_from_wrong_peer_is_discarded() {
        let (ecu_side, _client_side) = pair();
        let mut ecu = IsoTpSession::new(Box::new(ecu_side), 0x7E8, vec![0x7E0]);
        let frame = CanFrame::new_padded(0x123, &[0x02, 0x01, 0x0C]);
        assert_eq!(ecu.handle_inbound(&frame), IsoTpEvent::Discarded);
    }

    #[test]
    fn sequence_mismatch_aborts_transfer() {
        let (ecu_side, _client_side) = pair();
        let mut ecu = IsoTpSession::new(Box::new(ecu_side), 0x7E8, vec![0x7E0]);
        let ff = CanFrame::new_padded(0x7E0, &[0x10, 0x0A, 1, 2, 3, 4, 5, 6]);
        assert_eq!(ecu.handle_inbound(&ff), IsoTpEvent::Pending);
        let bad_cf = CanFrame::new_padded(0x7E0, &[0x22, 7, 8, 9, 10]); // seq 2, expected 1
        assert_eq!(ecu.handle_inbound(&bad_cf), IsoTpEvent::Discarded);
        assert!(!ecu.receiver.in_progress);
    }

    #[test]
    fn stalled_inbound_transfer_expires_after_n_cr() {
        let (ecu_side, _client_side) = pair();
        let mut ecu = IsoTpSession::new(Box::new(ecu_side), 0x7E8, vec![0x7E0]);
        let ff = CanFrame::new_padded(0x7E0, &[0x10, 0x0A, 1, 2, 3, 4, 5, 6]);
        assert_eq!(ecu.handle_inbound(&ff), IsoTpEvent::Pending);
        assert!(ecu.receiver.in_progress);

        // Force the recorded activity time far enough into the past that
        // N_Cr is considered expired without actually sleeping 1s in a
        // unit test.
        ecu.receiver.last_activity = Some(Instant::now() - N_CR_TIMEOUT - Duration::from_millis(1));
        assert!(ecu.next_frame(Duration::from_millis(1)).is_none());
        assert!(!ecu.receiver.in_progress, "N_Cr expiry should discard the stalled transfer");
    }
}
