//! ICMD inter-chip command framing.
//!
//! Every exchange with the peer is one of two frame shapes:
//! - a fixed 5-byte available-size query
//! - a 3-byte variable-length header (opcode, 14-bit length, lock flag)
//!   followed by the payload region
//!
//! The peer answers in the same full-duplex exchange, with its status byte
//! at offset 2 of the returned frame.

pub mod codec;
pub mod error;
pub mod opcode;

pub use codec::{
    decode_length, encode_length, encode_query, payload_len_for_capacity, query_size, status,
    VarlenHeader, FILL_BYTE, HEADER_LEN, LOCK_FLAG, MAX_TRANSFER_LEN, PAYLOAD_OFFSET,
    QUERY_FRAME_LEN, STATUS_OFFSET, STATUS_OK,
};
pub use error::{FrameError, Result};
pub use opcode::{Family, IntoSlotId, Opcode, SlotId, MAX_SLOT, SLOT_COUNT};
