use bytes::Bytes;
use icmdprims_bus::{BusConfig, BusHandle, ChipSelect, SpiTransfer};
use icmdprims_frame::{
    encode_query, query_size, status, IntoSlotId, SlotId, VarlenHeader, FILL_BYTE, HEADER_LEN,
    MAX_TRANSFER_LEN, PAYLOAD_OFFSET, STATUS_OK,
};
use tracing::{debug, warn};

use crate::error::{HostError, Result, Stage};

/// Slot the peer publishes its firmware version string in.
pub const VERSION_SLOT: SlotId = match SlotId::new(2) {
    Ok(slot) => slot,
    Err(_) => panic!("version slot out of range"),
};

/// Largest frame the wire format can describe: a full 14-bit payload plus
/// the header.
pub const DEFAULT_FRAME_LIMIT: usize = MAX_TRANSFER_LEN + HEADER_LEN;

/// Configuration for a host interface.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Bus transaction settings (exchange timeout).
    pub bus: BusConfig,
    /// Frame buffers larger than this are refused with
    /// [`HostError::AllocationFailure`] before the bus is touched.
    /// Default: [`DEFAULT_FRAME_LIMIT`].
    pub frame_limit: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            frame_limit: DEFAULT_FRAME_LIMIT,
        }
    }
}

/// Host side of the ICMD protocol.
///
/// Owns the bus handle for its whole lifetime. Every operation takes
/// `&mut self`, so only one transaction can be in flight at a time.
pub struct HostInterface<T, C> {
    bus: BusHandle<T, C>,
    frame_limit: usize,
}

impl<T: SpiTransfer, C: ChipSelect> HostInterface<T, C> {
    /// Create a host interface with default configuration.
    pub fn new(spi: T, cs: C) -> Self {
        Self::with_config(spi, cs, HostConfig::default())
    }

    /// Create a host interface with explicit configuration.
    pub fn with_config(spi: T, cs: C, config: HostConfig) -> Self {
        Self {
            bus: BusHandle::with_config(spi, cs, config.bus),
            frame_limit: config.frame_limit,
        }
    }

    /// Ask the peer how many bytes are available in `slot`.
    pub fn query_buffer_size(&mut self, slot: impl IntoSlotId) -> Result<u16> {
        let slot = slot.into_slot_id()?;
        let mut frame = encode_query(slot);

        debug!(slot = slot.get(), "querying available size");
        self.bus.exchange(&mut frame)?;
        check_status(Stage::Query, slot, &frame)?;

        let size = query_size(&frame);
        debug!(slot = slot.get(), size, "available size");
        Ok(size)
    }

    /// Pull `capacity - 3` bytes out of `slot`.
    ///
    /// `capacity` is the full frame length including the 3-byte header.
    /// With `reserve` set the lock flag asks the peer to treat the read as
    /// exclusive.
    pub fn receive(
        &mut self,
        slot: impl IntoSlotId,
        capacity: usize,
        reserve: bool,
    ) -> Result<Bytes> {
        let slot = slot.into_slot_id()?;
        let header = VarlenHeader::for_capacity(slot, capacity, reserve)?;

        let mut frame = alloc_frame(header.frame_len(), self.frame_limit)?;
        header.put(&mut frame);
        frame.resize(header.frame_len(), FILL_BYTE);

        debug!(
            slot = slot.get(),
            len = header.len(),
            lock = reserve,
            "receiving from peer buffer"
        );
        self.bus.exchange(&mut frame)?;
        check_status(Stage::Receive, slot, &frame)?;

        Ok(Bytes::from(frame).slice(PAYLOAD_OFFSET..))
    }

    /// Push `payload` into `slot`.
    ///
    /// The frame is the 3-byte header followed directly by the payload, the
    /// same layout a receive uses.
    pub fn send(&mut self, slot: impl IntoSlotId, payload: &[u8]) -> Result<()> {
        let slot = slot.into_slot_id()?;
        let header = VarlenHeader::new(slot, payload.len(), false)?;

        let mut frame = alloc_frame(header.frame_len(), self.frame_limit)?;
        header.put(&mut frame);
        frame.extend_from_slice(payload);

        debug!(slot = slot.get(), len = payload.len(), "sending to peer buffer");
        self.bus.exchange(&mut frame)?;
        check_status(Stage::Send, slot, &frame)
    }

    /// Read everything currently available in `slot`: a size query followed
    /// by a receive sized to match.
    pub fn read_slot(&mut self, slot: impl IntoSlotId, reserve: bool) -> Result<Bytes> {
        let slot = slot.into_slot_id()?;
        let size = self.query_buffer_size(slot)?;
        if size == 0 {
            return Err(HostError::EmptySlot(slot));
        }
        self.receive(slot, usize::from(size) + HEADER_LEN, reserve)
    }

    /// Read the peer's firmware version string.
    ///
    /// The read is reserved so the peer cannot update the string mid-read.
    pub fn firmware_version(&mut self) -> Result<String> {
        let raw = self.read_slot(VERSION_SLOT, true)?;
        Ok(decode_text(&raw))
    }

    /// Borrow the bus handle.
    pub fn bus(&self) -> &BusHandle<T, C> {
        &self.bus
    }
}

impl<T, C> std::fmt::Debug for HostInterface<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostInterface")
            .field("bus", &self.bus)
            .field("frame_limit", &self.frame_limit)
            .finish()
    }
}

fn alloc_frame(size: usize, limit: usize) -> Result<Vec<u8>> {
    if size > limit {
        return Err(HostError::AllocationFailure { size });
    }
    let mut frame = Vec::new();
    frame
        .try_reserve_exact(size)
        .map_err(|_| HostError::AllocationFailure { size })?;
    Ok(frame)
}

fn check_status(stage: Stage, slot: SlotId, frame: &[u8]) -> Result<()> {
    let status = status(frame)?;
    if status != STATUS_OK {
        warn!(%stage, slot = slot.get(), status, "peer rejected request");
        return Err(HostError::PeerRejected {
            stage,
            slot,
            status,
        });
    }
    Ok(())
}

/// Text up to the first NUL, lossily decoded.
pub fn decode_text(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use icmdprims_bus::BusError;
    use icmdprims_frame::FrameError;

    use super::*;

    /// Replies with canned frames and records what it was sent.
    #[derive(Default)]
    struct ScriptedBus {
        replies: VecDeque<std::result::Result<Vec<u8>, ()>>,
        sent: Vec<Vec<u8>>,
        asserts: usize,
        releases: usize,
    }

    impl ScriptedBus {
        fn reply(mut self, frame: &[u8]) -> Self {
            self.replies.push_back(Ok(frame.to_vec()));
            self
        }

        fn timeout(mut self) -> Self {
            self.replies.push_back(Err(()));
            self
        }
    }

    impl SpiTransfer for ScriptedBus {
        fn transfer_in_place(
            &mut self,
            buf: &mut [u8],
            timeout: Duration,
        ) -> icmdprims_bus::Result<()> {
            self.sent.push(buf.to_vec());
            match self.replies.pop_front() {
                Some(Ok(reply)) => {
                    let n = reply.len().min(buf.len());
                    buf[..n].copy_from_slice(&reply[..n]);
                    Ok(())
                }
                Some(Err(())) => Err(BusError::Timeout(timeout)),
                None => Err(BusError::Fault("no scripted reply".to_string())),
            }
        }
    }

    impl ChipSelect for ScriptedBus {
        fn assert_select(&mut self) -> icmdprims_bus::Result<()> {
            self.asserts += 1;
            Ok(())
        }

        fn release_select(&mut self) -> icmdprims_bus::Result<()> {
            self.releases += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Counter {
        asserts: usize,
        releases: usize,
    }

    impl ChipSelect for Counter {
        fn assert_select(&mut self) -> icmdprims_bus::Result<()> {
            self.asserts += 1;
            Ok(())
        }

        fn release_select(&mut self) -> icmdprims_bus::Result<()> {
            self.releases += 1;
            Ok(())
        }
    }

    fn host(bus: ScriptedBus) -> HostInterface<ScriptedBus, Counter> {
        HostInterface::new(bus, Counter::default())
    }

    #[test]
    fn query_decodes_little_endian_size() {
        let mut host = host(ScriptedBus::default().reply(&[0x00, 0x00, 0x00, 0x10, 0x00]));

        assert_eq!(host.query_buffer_size(3u8).unwrap(), 16);
        assert_eq!(host.bus().spi().sent[0], vec![0x13, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn out_of_range_slots_never_touch_the_bus() {
        let mut host = host(ScriptedBus::default());

        for bad in [32i64, 100, -1] {
            assert!(matches!(
                host.query_buffer_size(bad),
                Err(HostError::InvalidSlot(id)) if id == bad
            ));
            assert!(matches!(
                host.receive(bad, 19, false),
                Err(HostError::InvalidSlot(_))
            ));
            assert!(matches!(
                host.send(bad, b"x"),
                Err(HostError::InvalidSlot(_))
            ));
        }

        assert!(host.bus().spi().sent.is_empty());
        assert_eq!(host.bus().select().asserts, 0);
    }

    #[test]
    fn nonzero_status_is_peer_rejected_for_every_operation() {
        let rejecting = [0xAA, 0xBB, 0x01, 0x10, 0x00];
        let mut host = host(
            ScriptedBus::default()
                .reply(&rejecting)
                .reply(&rejecting)
                .reply(&rejecting),
        );

        assert!(matches!(
            host.query_buffer_size(0u8),
            Err(HostError::PeerRejected {
                stage: Stage::Query,
                status: 0x01,
                ..
            })
        ));
        assert!(matches!(
            host.receive(1u8, 19, false),
            Err(HostError::PeerRejected {
                stage: Stage::Receive,
                ..
            })
        ));
        assert!(matches!(
            host.send(0u8, &[0u8; 16]),
            Err(HostError::PeerRejected {
                stage: Stage::Send,
                ..
            })
        ));
    }

    #[test]
    fn bus_error_releases_select_once_per_call() {
        let mut host = host(ScriptedBus::default().timeout().timeout().timeout());

        assert!(matches!(
            host.query_buffer_size(0u8),
            Err(HostError::Bus(BusError::Timeout(_)))
        ));
        assert!(matches!(
            host.receive(1u8, 19, true),
            Err(HostError::Bus(_))
        ));
        assert!(matches!(host.send(0u8, b"abc"), Err(HostError::Bus(_))));

        assert_eq!(host.bus().select().asserts, 3);
        assert_eq!(host.bus().select().releases, 3);
    }

    #[test]
    fn frames_over_limit_fail_allocation_without_select() {
        let config = HostConfig {
            frame_limit: 8,
            ..HostConfig::default()
        };
        let bus = ScriptedBus::default().reply(&[0x00, 0x00, 0x00, 1, 2, 3, 4, 5]);
        let mut host = HostInterface::with_config(bus, Counter::default(), config);

        assert!(matches!(
            host.receive(2u8, 19, true),
            Err(HostError::AllocationFailure { size: 19 })
        ));
        assert!(matches!(
            host.send(0u8, &[0u8; 16]),
            Err(HostError::AllocationFailure { size: 19 })
        ));
        assert!(host.bus().spi().sent.is_empty());
        assert_eq!(host.bus().select().asserts, 0);

        let payload = host.receive(1u8, 8, false).unwrap();
        assert_eq!(payload.as_ref(), &[1, 2, 3, 4, 5]);
        assert_eq!(host.bus().select().asserts, 1);
    }

    #[test]
    fn default_limit_covers_largest_frame() {
        assert_eq!(HostConfig::default().frame_limit, 0x3FFF + HEADER_LEN);
    }

    #[test]
    fn receive_sets_lock_flag_and_returns_payload() {
        let mut reply = vec![0x00, 0x00, 0x00];
        reply.extend_from_slice(b"ICMD-SIM v1.0.00");
        let mut host = host(ScriptedBus::default().reply(&reply));

        let payload = host.receive(2u8, 19, true).unwrap();

        assert_eq!(payload.as_ref(), b"ICMD-SIM v1.0.00");
        let sent = &host.bus().spi().sent[0];
        assert_eq!(sent.len(), 19);
        assert_eq!(&sent[..3], &[0xA2, 0x10, 0x40]);
    }

    #[test]
    fn send_frame_is_header_then_payload() {
        let mut host = host(ScriptedBus::default().reply(&[0, 0, 0]));
        let payload: Vec<u8> = (0..16).collect();

        host.send(0u8, &payload).unwrap();

        let sent = &host.bus().spi().sent[0];
        assert_eq!(sent.len(), HEADER_LEN + 16);
        assert_eq!(&sent[..3], &[0xA0, 0x10, 0x00]);
        assert_eq!(&sent[3..], payload.as_slice());
    }

    #[test]
    fn invalid_lengths_rejected_before_bus() {
        let mut host = host(ScriptedBus::default());

        assert!(matches!(
            host.receive(0u8, 2, false),
            Err(HostError::InvalidLength(FrameError::CapacityTooSmall { .. }))
        ));
        let oversized = vec![0u8; 0x4000];
        assert!(matches!(
            host.send(0u8, &oversized),
            Err(HostError::InvalidLength(FrameError::LengthOverflow { .. }))
        ));
        assert!(host.bus().spi().sent.is_empty());
    }

    #[test]
    fn read_slot_queries_then_receives() {
        let mut reply = vec![0x00, 0x00, 0x00];
        reply.extend_from_slice(b"abc");
        let mut host = host(
            ScriptedBus::default()
                .reply(&[0x00, 0x00, 0x00, 0x03, 0x00])
                .reply(&reply),
        );

        let data = host.read_slot(1u8, false).unwrap();

        assert_eq!(data.as_ref(), b"abc");
        assert_eq!(host.bus().spi().sent[1][..3], [0xA1, 0x03, 0x00]);
    }

    #[test]
    fn read_slot_rejects_empty_slot() {
        let mut host = host(ScriptedBus::default().reply(&[0x00, 0x00, 0x00, 0x00, 0x00]));

        assert!(matches!(
            host.read_slot(1u8, false),
            Err(HostError::EmptySlot(slot)) if slot.get() == 1
        ));
        assert_eq!(host.bus().spi().sent.len(), 1);
    }

    #[test]
    fn firmware_version_trims_at_nul() {
        let mut reply = vec![0x00, 0x00, 0x00];
        reply.extend_from_slice(b"v2.1\0\0\0\0");
        let mut host = host(
            ScriptedBus::default()
                .reply(&[0x00, 0x00, 0x00, 0x08, 0x00])
                .reply(&reply),
        );

        assert_eq!(host.firmware_version().unwrap(), "v2.1");
        assert_eq!(host.bus().spi().sent[1][..3], [0xA2, 0x08, 0x40]);
    }

    #[test]
    fn scripted_bus_can_also_drive_select() {
        let bus = ScriptedBus::default().reply(&[0x00, 0x00, 0x00, 0x01, 0x00]);
        let mut select = ScriptedBus::default();
        let mut host = HostInterface::new(bus, &mut select);

        assert_eq!(host.query_buffer_size(0u8).unwrap(), 1);
        drop(host);
        assert_eq!((select.asserts, select.releases), (1, 1));
    }
}
