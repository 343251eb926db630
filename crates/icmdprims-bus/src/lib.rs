//! Full-duplex SPI bus abstraction for ICMD hosts.
//!
//! Provides the two collaborator primitives the host consumes:
//! - [`SpiTransfer`]: one blocking full-duplex exchange, bounded by a timeout
//! - [`ChipSelect`]: the peer's active-low select line
//!
//! and [`BusHandle`], which owns both and runs every exchange as a
//! select-bracketed transaction. Backends: Linux spidev with an optional
//! sysfs GPIO chip-select, [`KernelSelect`] when the controller drives CS,
//! or any `embedded-hal` SPI peripheral and output pin via [`HalSpi`] and
//! [`PinSelect`].

pub mod error;
#[cfg(target_os = "linux")]
pub mod gpio;
pub mod hal;
#[cfg(target_os = "linux")]
pub mod spidev;
pub mod traits;
pub mod transaction;

pub use error::{BusError, Result};
pub use hal::{HalSpi, PinSelect};
pub use traits::{ChipSelect, KernelSelect, SpiTransfer};
pub use transaction::{BusConfig, BusHandle, DEFAULT_TIMEOUT};

#[cfg(target_os = "linux")]
pub use gpio::SysfsGpio;
#[cfg(target_os = "linux")]
pub use spidev::{Spidev, SpidevConfig, SPI_NO_CS};
