use std::time::Duration;

use crate::error::{BusError, Result};

/// A synchronous full-duplex transfer primitive.
///
/// Every clocked-out byte clocks one byte in. Implementations overwrite the
/// buffer in place with what the peer drove on the return line, so the
/// outgoing header and the incoming status share the same offsets.
pub trait SpiTransfer {
    /// Exchange `buf.len()` bytes in place (blocking).
    ///
    /// Must fail with [`BusError::Timeout`] when the exchange does not
    /// complete within `timeout`.
    fn transfer_in_place(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()>;

    /// Exchange `tx` for `rx` (blocking). Both slices must have equal length.
    fn transceive(&mut self, tx: &[u8], rx: &mut [u8], timeout: Duration) -> Result<()> {
        if tx.len() != rx.len() {
            return Err(BusError::LengthMismatch {
                tx: tx.len(),
                rx: rx.len(),
            });
        }
        rx.copy_from_slice(tx);
        self.transfer_in_place(rx, timeout)
    }
}

/// Control over the peer's chip-select line.
///
/// "Assert" means driving the line to its active level (low for ICMD peers).
pub trait ChipSelect {
    /// Drive chip-select active.
    fn assert_select(&mut self) -> Result<()>;

    /// Drive chip-select inactive.
    fn release_select(&mut self) -> Result<()>;
}

impl<T: SpiTransfer + ?Sized> SpiTransfer for &mut T {
    fn transfer_in_place(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        (**self).transfer_in_place(buf, timeout)
    }
}

impl<T: ChipSelect + ?Sized> ChipSelect for &mut T {
    fn assert_select(&mut self) -> Result<()> {
        (**self).assert_select()
    }

    fn release_select(&mut self) -> Result<()> {
        (**self).release_select()
    }
}

/// Chip-select that does nothing, for controllers that drive CS in hardware
/// for the duration of each transfer.
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelSelect;

impl ChipSelect for KernelSelect {
    fn assert_select(&mut self) -> Result<()> {
        Ok(())
    }

    fn release_select(&mut self) -> Result<()> {
        Ok(())
    }
}
