//! Buffer slot ids and opcode families.
//!
//! Each family owns a disjoint 32-entry range, one opcode per slot:
//!
//! | Family                  | Range          |
//! |-------------------------|----------------|
//! | available size query    | `0x10..=0x2F`  |
//! | fixed-length transfer   | `0x80..=0x9F`  |
//! | variable-length transfer| `0xA0..=0xBF`  |
//!
//! Every other byte value is unassigned.

use crate::error::{FrameError, Result};

/// Number of addressable buffer slots.
pub const SLOT_COUNT: u8 = 32;

/// Highest valid slot id.
pub const MAX_SLOT: u8 = SLOT_COUNT - 1;

/// Base opcode of the available-size query family.
pub const AVAILABLE_SIZE_BASE: u8 = 0x10;

/// Base opcode of the fixed-length transfer family (defined, not issued).
pub const FIXLEN_TRANS_BASE: u8 = 0x80;

/// Base opcode of the variable-length transfer family.
pub const VARLEN_TRANS_BASE: u8 = 0xA0;

const _: () = {
    assert!(AVAILABLE_SIZE_BASE as u16 + SLOT_COUNT as u16 <= FIXLEN_TRANS_BASE as u16);
    assert!(FIXLEN_TRANS_BASE as u16 + SLOT_COUNT as u16 <= VARLEN_TRANS_BASE as u16);
    assert!(VARLEN_TRANS_BASE as u16 + SLOT_COUNT as u16 <= 0x100);
};

/// A peer buffer slot id, guaranteed to be in `0..=31`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u8);

impl SlotId {
    /// Validate and wrap a raw slot id.
    pub const fn new(id: u8) -> Result<Self> {
        if id <= MAX_SLOT {
            Ok(Self(id))
        } else {
            Err(FrameError::InvalidSlot(id as i64))
        }
    }

    /// The raw slot number.
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conversion into a range-checked [`SlotId`].
///
/// Implemented for the integer types callers typically hold so that
/// out-of-range and negative ids are rejected in one place.
pub trait IntoSlotId {
    fn into_slot_id(self) -> Result<SlotId>;
}

impl IntoSlotId for SlotId {
    fn into_slot_id(self) -> Result<SlotId> {
        Ok(self)
    }
}

macro_rules! impl_into_slot_id {
    ($($ty:ty),*) => {
        $(
            impl IntoSlotId for $ty {
                fn into_slot_id(self) -> Result<SlotId> {
                    match u8::try_from(self) {
                        Ok(id) => SlotId::new(id),
                        Err(_) => Err(FrameError::InvalidSlot(
                            i64::try_from(self).unwrap_or(i64::MAX),
                        )),
                    }
                }
            }
        )*
    };
}

impl_into_slot_id!(u16, u32, u64, usize, i8, i16, i32, i64);

impl IntoSlotId for u8 {
    fn into_slot_id(self) -> Result<SlotId> {
        SlotId::new(self)
    }
}

/// The three ICMD command families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    AvailableSize,
    FixedLength,
    VariableLength,
}

impl Family {
    /// First opcode of the family (slot 0).
    pub const fn base(self) -> u8 {
        match self {
            Family::AvailableSize => AVAILABLE_SIZE_BASE,
            Family::FixedLength => FIXLEN_TRANS_BASE,
            Family::VariableLength => VARLEN_TRANS_BASE,
        }
    }

    /// Human-readable family name.
    pub const fn name(self) -> &'static str {
        match self {
            Family::AvailableSize => "AVAILABLE_SIZE",
            Family::FixedLength => "FIXLEN_TRANS",
            Family::VariableLength => "VARLEN_TRANS",
        }
    }
}

/// An opcode: a family applied to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode {
    pub family: Family,
    pub slot: SlotId,
}

impl Opcode {
    pub const fn available_size(slot: SlotId) -> Self {
        Self {
            family: Family::AvailableSize,
            slot,
        }
    }

    pub const fn fixed_length(slot: SlotId) -> Self {
        Self {
            family: Family::FixedLength,
            slot,
        }
    }

    pub const fn variable_length(slot: SlotId) -> Self {
        Self {
            family: Family::VariableLength,
            slot,
        }
    }

    /// Wire value of this opcode.
    pub const fn byte(self) -> u8 {
        self.family.base() + self.slot.get()
    }

    /// Parse a wire opcode back into family and slot.
    pub fn decode(byte: u8) -> Result<Self> {
        let family = match byte {
            0x10..=0x2F => Family::AvailableSize,
            0x80..=0x9F => Family::FixedLength,
            0xA0..=0xBF => Family::VariableLength,
            _ => return Err(FrameError::UnknownOpcode(byte)),
        };
        Ok(Self {
            family,
            slot: SlotId(byte - family.base()),
        })
    }
}
