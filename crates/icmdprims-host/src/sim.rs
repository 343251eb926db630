//! In-memory ICMD peer for tests and hardware-free runs.
//!
//! The peer decodes each frame exactly as a real device would see it on the
//! wire and answers in place. Because ICMD uses the same variable-length
//! opcode for both directions, each slot's role decides whether a transfer
//! is a read or a write:
//!
//! - static slots serve a fixed byte string and are not drained
//! - readable slots drain as they are read
//! - writable slots forward what is written to a readable slot (loopback)

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use icmdprims_bus::{BusError, ChipSelect, SpiTransfer};
use icmdprims_frame::{
    Family, Opcode, SlotId, VarlenHeader, PAYLOAD_OFFSET, QUERY_FRAME_LEN, SLOT_COUNT,
    STATUS_OFFSET, STATUS_OK,
};
use tracing::{debug, trace};

/// Slot is not mapped on this peer.
pub const STATUS_NO_BUFFER: u8 = 0x01;
/// Frame length disagrees with the header.
pub const STATUS_BAD_LENGTH: u8 = 0x02;
/// Read asked for more than is available.
pub const STATUS_UNDERRUN: u8 = 0x03;
/// Write does not fit the remaining capacity.
pub const STATUS_OVERFLOW: u8 = 0x04;
/// Command family not implemented.
pub const STATUS_UNSUPPORTED: u8 = 0x05;

/// Version string served by [`SimulatedPeer::loopback`].
pub const DEFAULT_SIM_VERSION: &str = "ICMD-SIM v1.0.00";

/// Capacity of the loopback slots.
pub const DEFAULT_LOOPBACK_CAPACITY: usize = 1024;

/// Failure to inject into the next exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The transfer primitive fails.
    Bus,
    /// The transfer primitive times out.
    Timeout,
    /// The exchange succeeds but the peer answers with this status.
    Status(u8),
}

/// Counters observed by the peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimStats {
    pub asserts: usize,
    pub releases: usize,
    pub exchanges: usize,
    pub locked_reads: usize,
    pub bytes_written: usize,
    pub bytes_read: usize,
}

#[derive(Debug, Clone)]
enum SimSlot {
    Unmapped,
    Static(Bytes),
    Readable { capacity: usize, data: VecDeque<u8> },
    Writable { route: SlotId },
}

#[derive(Debug)]
struct SimState {
    slots: Vec<SimSlot>,
    selected: bool,
    latency: Duration,
    faults: VecDeque<Fault>,
    stats: SimStats,
}

/// A simulated peer device.
///
/// Cloning yields another handle on the same device, so one clone can be the
/// transfer primitive and another the chip-select line.
#[derive(Debug, Clone)]
pub struct SimulatedPeer {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPeer {
    /// A peer with no slots mapped.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                slots: vec![SimSlot::Unmapped; usize::from(SLOT_COUNT)],
                selected: false,
                latency: Duration::ZERO,
                faults: VecDeque::new(),
                stats: SimStats::default(),
            })),
        }
    }

    /// The standard layout: version string on slot 2, writes to slot 0
    /// readable back from slot 1.
    pub fn loopback(version: &str) -> Self {
        let tx = slot(0);
        let rx = slot(1);
        Self::new()
            .with_static(slot(2), version.as_bytes().to_vec())
            .with_loopback(tx, rx, DEFAULT_LOOPBACK_CAPACITY)
    }

    /// Serve `data` from `slot` without draining it.
    pub fn with_static(self, slot: SlotId, data: impl Into<Bytes>) -> Self {
        self.lock().slots[index(slot)] = SimSlot::Static(data.into());
        self
    }

    /// Make writes to `tx` readable from `rx`, holding at most `capacity`
    /// bytes.
    pub fn with_loopback(self, tx: SlotId, rx: SlotId, capacity: usize) -> Self {
        {
            let mut state = self.lock();
            state.slots[index(rx)] = SimSlot::Readable {
                capacity,
                data: VecDeque::new(),
            };
            state.slots[index(tx)] = SimSlot::Writable { route: rx };
        }
        self
    }

    /// Pretend each exchange takes `latency`; exchanges whose timeout is
    /// shorter fail with [`BusError::Timeout`].
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// Queue a fault for the next exchange.
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    /// Snapshot of the peer's counters.
    pub fn stats(&self) -> SimStats {
        self.lock().stats.clone()
    }

    /// Whether chip-select is currently asserted.
    pub fn is_selected(&self) -> bool {
        self.lock().selected
    }

    /// Bytes currently held in `slot`.
    pub fn available(&self, slot: SlotId) -> usize {
        match &self.lock().slots[index(slot)] {
            SimSlot::Static(data) => data.len(),
            SimSlot::Readable { data, .. } => data.len(),
            SimSlot::Unmapped | SimSlot::Writable { .. } => 0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SpiTransfer for SimulatedPeer {
    fn transfer_in_place(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> icmdprims_bus::Result<()> {
        let mut state = self.lock();
        if !state.selected {
            return Err(BusError::NotSelected);
        }
        state.stats.exchanges += 1;

        if state.latency > timeout {
            return Err(BusError::Timeout(timeout));
        }
        match state.faults.pop_front() {
            Some(Fault::Bus) => return Err(BusError::Fault("injected bus fault".to_string())),
            Some(Fault::Timeout) => return Err(BusError::Timeout(timeout)),
            Some(Fault::Status(status)) => {
                if let Some(byte) = buf.get_mut(STATUS_OFFSET) {
                    *byte = status;
                }
                return Ok(());
            }
            None => {}
        }

        let status = state.respond(buf);
        if let Some(byte) = buf.get_mut(STATUS_OFFSET) {
            *byte = status;
        }
        trace!(len = buf.len(), status, "simulated exchange");
        Ok(())
    }
}

impl ChipSelect for SimulatedPeer {
    fn assert_select(&mut self) -> icmdprims_bus::Result<()> {
        let mut state = self.lock();
        state.selected = true;
        state.stats.asserts += 1;
        Ok(())
    }

    fn release_select(&mut self) -> icmdprims_bus::Result<()> {
        let mut state = self.lock();
        state.selected = false;
        state.stats.releases += 1;
        Ok(())
    }
}

impl SimState {
    /// Act on one frame and return the status to echo.
    fn respond(&mut self, buf: &mut [u8]) -> u8 {
        let Some(&first) = buf.first() else {
            return STATUS_BAD_LENGTH;
        };
        let opcode = match Opcode::decode(first) {
            Ok(opcode) => opcode,
            Err(_) => return STATUS_UNSUPPORTED,
        };

        match opcode.family {
            Family::AvailableSize => self.respond_query(opcode.slot, buf),
            Family::VariableLength => self.respond_varlen(buf),
            Family::FixedLength => STATUS_UNSUPPORTED,
        }
    }

    fn respond_query(&mut self, slot: SlotId, buf: &mut [u8]) -> u8 {
        if buf.len() != QUERY_FRAME_LEN {
            return STATUS_BAD_LENGTH;
        }
        let size = match &self.slots[index(slot)] {
            SimSlot::Unmapped => return STATUS_NO_BUFFER,
            SimSlot::Static(data) => data.len(),
            SimSlot::Readable { data, .. } => data.len(),
            SimSlot::Writable { route } => match &self.slots[index(*route)] {
                SimSlot::Readable { capacity, data } => capacity.saturating_sub(data.len()),
                _ => 0,
            },
        };
        let size = u16::try_from(size).unwrap_or(u16::MAX);
        buf[1] = 0x00;
        buf[3..5].copy_from_slice(&size.to_le_bytes());
        debug!(slot = slot.get(), size, "simulated size query");
        STATUS_OK
    }

    fn respond_varlen(&mut self, buf: &mut [u8]) -> u8 {
        let header = match VarlenHeader::decode(buf) {
            Ok(header) => header,
            Err(_) => return STATUS_BAD_LENGTH,
        };
        if buf.len() != header.frame_len() {
            return STATUS_BAD_LENGTH;
        }
        let len = header.len();

        match self.slots[index(header.slot)].clone() {
            SimSlot::Unmapped => STATUS_NO_BUFFER,
            SimSlot::Static(data) => {
                if len > data.len() {
                    return STATUS_UNDERRUN;
                }
                buf[PAYLOAD_OFFSET..].copy_from_slice(&data[..len]);
                self.note_read(header.lock, len);
                STATUS_OK
            }
            SimSlot::Readable { .. } => {
                let SimSlot::Readable { data, .. } = &mut self.slots[index(header.slot)] else {
                    return STATUS_NO_BUFFER;
                };
                if len > data.len() {
                    return STATUS_UNDERRUN;
                }
                for (dst, src) in buf[PAYLOAD_OFFSET..].iter_mut().zip(data.drain(..len)) {
                    *dst = src;
                }
                self.note_read(header.lock, len);
                STATUS_OK
            }
            SimSlot::Writable { route } => {
                let SimSlot::Readable { capacity, data } = &mut self.slots[index(route)] else {
                    return STATUS_NO_BUFFER;
                };
                if data.len() + len > *capacity {
                    return STATUS_OVERFLOW;
                }
                data.extend(&buf[PAYLOAD_OFFSET..]);
                self.stats.bytes_written += len;
                STATUS_OK
            }
        }
    }

    fn note_read(&mut self, locked: bool, len: usize) {
        if locked {
            self.stats.locked_reads += 1;
        }
        self.stats.bytes_read += len;
    }
}

fn slot(id: u8) -> SlotId {
    match SlotId::new(id) {
        Ok(slot) => slot,
        Err(_) => unreachable!("fixed slot ids are in range"),
    }
}

fn index(slot: SlotId) -> usize {
    usize::from(slot.get())
}
