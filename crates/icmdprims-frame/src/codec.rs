use bytes::BufMut;

use crate::error::{FrameError, Result};
use crate::opcode::{Family, Opcode, SlotId};

/// Size of a query frame, both directions.
pub const QUERY_FRAME_LEN: usize = 5;

/// Variable-length header: opcode (1) + length/flags (2) = 3 bytes.
pub const HEADER_LEN: usize = 3;

/// Offset of the peer status byte in any returned frame.
pub const STATUS_OFFSET: usize = 2;

/// Offset of the payload in a variable-length frame.
pub const PAYLOAD_OFFSET: usize = HEADER_LEN;

/// Filler for bytes the peer overwrites; never a valid all-ok reply.
pub const FILL_BYTE: u8 = 0xFF;

/// Status value meaning success.
pub const STATUS_OK: u8 = 0x00;

/// Largest value of the 14-bit length field.
pub const MAX_TRANSFER_LEN: usize = 0x3FFF;

/// Length bits carried in the high byte.
pub const LENGTH_HIGH_MASK: u8 = 0x3F;

/// Lock (reservation) flag in the high byte.
pub const LOCK_FLAG: u8 = 0x40;

/// Build the 5-byte available-size query for `slot`.
///
/// ```text
/// ┌────────────┬──────┬──────┬──────┬──────┐
/// │ 0x10+slot  │ 0xFF │ 0xFF │ 0xFF │ 0xFF │   host -> peer
/// ├────────────┼──────┼──────┼──────┼──────┤
/// │     ?      │  ?   │status│size_l│size_h│   peer -> host
/// └────────────┴──────┴──────┴──────┴──────┘
/// ```
pub fn encode_query(slot: SlotId) -> [u8; QUERY_FRAME_LEN] {
    let mut frame = [FILL_BYTE; QUERY_FRAME_LEN];
    frame[0] = Opcode::available_size(slot).byte();
    frame
}

/// Status byte of a returned frame.
pub fn status(frame: &[u8]) -> Result<u8> {
    frame
        .get(STATUS_OFFSET)
        .copied()
        .ok_or(FrameError::Truncated {
            len: frame.len(),
            need: STATUS_OFFSET + 1,
        })
}

/// Available size carried by a returned query frame. Only meaningful once
/// [`status`] has been checked.
pub fn query_size(frame: &[u8; QUERY_FRAME_LEN]) -> u16 {
    u16::from_le_bytes([frame[3], frame[4]])
}

/// Pack a transfer length and lock flag into the two length bytes.
///
/// Bits above the 14-bit field are dropped; bit 7 of the high byte is
/// always zero.
pub fn encode_length(len: u16, lock: bool) -> [u8; 2] {
    let low = (len & 0xFF) as u8;
    let mut high = ((len >> 8) as u8) & LENGTH_HIGH_MASK;
    if lock {
        high |= LOCK_FLAG;
    }
    [low, high]
}

/// Unpack the two length bytes into length and lock flag.
pub fn decode_length(bytes: [u8; 2]) -> (u16, bool) {
    let len = u16::from(bytes[0]) | (u16::from(bytes[1] & LENGTH_HIGH_MASK) << 8);
    (len, bytes[1] & LOCK_FLAG != 0)
}

/// Header of a variable-length transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarlenHeader {
    pub slot: SlotId,
    len: u16,
    pub lock: bool,
}

impl VarlenHeader {
    /// Build a header, rejecting lengths that do not fit 14 bits.
    pub fn new(slot: SlotId, len: usize, lock: bool) -> Result<Self> {
        if len > MAX_TRANSFER_LEN {
            return Err(FrameError::LengthOverflow {
                len,
                max: MAX_TRANSFER_LEN,
            });
        }
        Ok(Self {
            slot,
            len: len as u16,
            lock,
        })
    }

    /// Header for a receive into a frame of `capacity` total bytes.
    pub fn for_capacity(slot: SlotId, capacity: usize, lock: bool) -> Result<Self> {
        Self::new(slot, payload_len_for_capacity(capacity)?, lock)
    }

    /// Negotiated payload length.
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total frame length: header plus payload.
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.len()
    }

    /// Header bytes on the wire.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let [low, high] = encode_length(self.len, self.lock);
        [Opcode::variable_length(self.slot).byte(), low, high]
    }

    /// Append the header to `dst`.
    pub fn put(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.encode());
    }

    /// Parse a header from the start of an outgoing frame.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_LEN {
            return Err(FrameError::Truncated {
                len: src.len(),
                need: HEADER_LEN,
            });
        }
        let opcode = Opcode::decode(src[0])?;
        if opcode.family != Family::VariableLength {
            return Err(FrameError::UnexpectedFamily(opcode.family.name()));
        }
        let (len, lock) = decode_length([src[1], src[2]]);
        Ok(Self {
            slot: opcode.slot,
            len,
            lock,
        })
    }
}

/// Payload bytes available in a frame of `capacity` total bytes.
pub fn payload_len_for_capacity(capacity: usize) -> Result<usize> {
    let len = capacity
        .checked_sub(HEADER_LEN)
        .ok_or(FrameError::CapacityTooSmall {
            capacity,
            min: HEADER_LEN,
        })?;
    if len > MAX_TRANSFER_LEN {
        return Err(FrameError::LengthOverflow {
            len,
            max: MAX_TRANSFER_LEN,
        });
    }
    Ok(len)
}
