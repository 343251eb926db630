use std::time::Duration;

use tracing::{trace, warn};

use crate::error::Result;
use crate::traits::{ChipSelect, SpiTransfer};

/// Default bound on a single exchange: 1000 ms.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Configuration for the bus handle.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Upper bound on one full-duplex exchange. Default: 1000 ms.
    pub timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Exclusive handle on one SPI bus and the chip-select line of its peer.
///
/// Built once at startup and owned by whoever issues transactions. Every
/// exchange goes through [`BusHandle::exchange`], which brackets the transfer
/// with chip-select assert and release.
pub struct BusHandle<T, C> {
    spi: T,
    cs: C,
    config: BusConfig,
}

impl<T: SpiTransfer, C: ChipSelect> BusHandle<T, C> {
    /// Create a handle with default configuration.
    pub fn new(spi: T, cs: C) -> Self {
        Self::with_config(spi, cs, BusConfig::default())
    }

    /// Create a handle with explicit configuration.
    pub fn with_config(spi: T, cs: C, config: BusConfig) -> Self {
        Self { spi, cs, config }
    }

    /// Run one gated full-duplex exchange over `frame`, in place.
    ///
    /// Chip-select is asserted first and released before returning on every
    /// path, including a failed exchange and a panic inside the transfer.
    /// If asserting fails the transfer is not attempted.
    pub fn exchange(&mut self, frame: &mut [u8]) -> Result<()> {
        if let Err(err) = self.cs.assert_select() {
            // Line state is unknown after a failed assert; drive it back.
            if let Err(release_err) = self.cs.release_select() {
                warn!(error = %release_err, "chip-select release failed after assert error");
            }
            return Err(err);
        }
        trace!(len = frame.len(), "chip-select asserted");

        let guard = SelectGuard {
            cs: &mut self.cs,
            released: false,
        };
        let exchanged = self.spi.transfer_in_place(frame, self.config.timeout);
        let released = guard.release();

        match (exchanged, released) {
            (Ok(()), released) => released,
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                warn!(error = %release_err, "chip-select release failed after exchange error");
                Err(err)
            }
        }
    }

    /// Current exchange timeout.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Update the timeout for subsequent exchanges.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    /// Borrow the transfer primitive.
    pub fn spi(&self) -> &T {
        &self.spi
    }

    /// Borrow the chip-select line.
    pub fn select(&self) -> &C {
        &self.cs
    }
}

impl<T, C> std::fmt::Debug for BusHandle<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusHandle")
            .field("timeout", &self.config.timeout)
            .finish_non_exhaustive()
    }
}

/// Releases chip-select when dropped unless released explicitly.
struct SelectGuard<'a, C: ChipSelect> {
    cs: &'a mut C,
    released: bool,
}

impl<C: ChipSelect> SelectGuard<'_, C> {
    fn release(mut self) -> Result<()> {
        self.released = true;
        let result = self.cs.release_select();
        trace!("chip-select released");
        result
    }
}

impl<C: ChipSelect> Drop for SelectGuard<'_, C> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(err) = self.cs.release_select() {
                warn!(error = %err, "chip-select release failed during unwind");
            }
        }
    }
}
