//! Host side of the ICMD inter-chip command protocol.
//!
//! [`HostInterface`] owns a gated SPI bus and exposes the three buffer
//! operations a host issues against its peer: available-size query, receive
//! (optionally reserved with the lock flag), and send. Each call builds one
//! frame, runs one select-bracketed full-duplex exchange, and validates the
//! echoed status byte before trusting anything else in the reply.

#[cfg(feature = "async")]
pub mod async_host;
pub mod error;
pub mod interface;
pub mod sim;

#[cfg(feature = "async")]
pub use async_host::AsyncHostInterface;
pub use error::{HostError, Result, Stage};
pub use interface::{decode_text, HostConfig, HostInterface, DEFAULT_FRAME_LIMIT, VERSION_SLOT};
pub use sim::{Fault, SimStats, SimulatedPeer, DEFAULT_SIM_VERSION};
