use std::fmt;

use icmdprims_bus::BusError;
use icmdprims_frame::{FrameError, SlotId};

/// Which operation a peer rejection happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Query,
    Receive,
    Send,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Query => "size query",
            Stage::Receive => "receive",
            Stage::Send => "send",
        })
    }
}

/// Errors that can occur in host interface operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Slot id outside `0..=31`; no bus activity took place.
    #[error("invalid buffer slot {0} (expected 0..=31)")]
    InvalidSlot(i64),

    /// Capacity or payload length cannot be framed.
    #[error("invalid transfer length: {0}")]
    InvalidLength(FrameError),

    /// The frame buffer could not be allocated.
    #[error("allocation failed for {size}-byte frame")]
    AllocationFailure { size: usize },

    /// The exchange failed or timed out.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// The exchange completed but the peer's status byte was nonzero.
    #[error("peer rejected {stage} on slot {slot} (status 0x{status:02x})")]
    PeerRejected {
        stage: Stage,
        slot: SlotId,
        status: u8,
    },

    /// The peer reports nothing available in the slot.
    #[error("slot {0} has no data available")]
    EmptySlot(SlotId),

    /// The blocking task running an async operation did not complete.
    #[cfg(feature = "async")]
    #[error("blocking task failed: {0}")]
    TaskJoin(String),
}

impl From<FrameError> for HostError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::InvalidSlot(id) => HostError::InvalidSlot(id),
            other => HostError::InvalidLength(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, HostError>;
