//! Host-side access to peer-owned buffers over the ICMD inter-chip protocol.
//!
//! # Crate Structure
//!
//! - [`bus`]: SPI transfer and chip-select primitives, gated transactions,
//!   Linux spidev and sysfs GPIO backends
//! - [`frame`]: Slot ids, opcode families, header codec
//! - [`host`]: Buffer size query, receive and send, plus a simulated peer

/// Re-export bus types.
pub mod bus {
    pub use icmdprims_bus::*;
}

/// Re-export frame types.
pub mod frame {
    pub use icmdprims_frame::*;
}

/// Re-export host types.
pub mod host {
    pub use icmdprims_host::*;
}
