/// Errors that can occur while building or parsing ICMD frames.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    /// Slot id outside `0..=31`.
    #[error("invalid buffer slot {0} (expected 0..=31)")]
    InvalidSlot(i64),

    /// Transfer length does not fit the 14-bit length field.
    #[error("transfer length {len} exceeds {max}")]
    LengthOverflow { len: usize, max: usize },

    /// Frame capacity cannot hold the header.
    #[error("frame capacity {capacity} is smaller than the {min}-byte header")]
    CapacityTooSmall { capacity: usize, min: usize },

    /// Byte is not in any reserved opcode range.
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    /// Opcode belongs to a family that is not valid here.
    #[error("unexpected opcode family {0}")]
    UnexpectedFamily(&'static str),

    /// Fewer bytes than the frame shape requires.
    #[error("truncated frame ({len} bytes, need {need})")]
    Truncated { len: usize, need: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
