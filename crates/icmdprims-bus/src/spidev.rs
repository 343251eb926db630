use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{BusError, Result};
use crate::traits::SpiTransfer;

// Request codes from <linux/spi/spidev.h>: _IOW('k', nr, size).
const SPI_IOC_WR_MODE: u32 = 0x4001_6b01;
const SPI_IOC_WR_BITS_PER_WORD: u32 = 0x4001_6b03;
const SPI_IOC_WR_MAX_SPEED_HZ: u32 = 0x4004_6b04;
/// `SPI_IOC_MESSAGE(1)`: one `spi_ioc_transfer` of 32 bytes.
const SPI_IOC_MESSAGE_1: u32 = 0x4020_6b00;

/// Keeps chip-select deasserted across the whole transfer; used when an
/// external GPIO drives the line.
pub const SPI_NO_CS: u8 = 0x40;

/// Mirror of the kernel's `struct spi_ioc_transfer`.
#[repr(C)]
#[derive(Default)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    pad: u8,
}

const _: () = assert!(std::mem::size_of::<SpiIocTransfer>() == 32);

/// Settings applied to a spidev node when it is opened.
#[derive(Debug, Clone)]
pub struct SpidevConfig {
    /// SPI mode bits (CPOL/CPHA, plus flags such as [`SPI_NO_CS`]). Default: 3.
    pub mode: u8,
    /// Word size. Default: 8.
    pub bits_per_word: u8,
    /// Clock ceiling in Hz. Default: 4 MHz.
    pub max_speed_hz: u32,
}

impl Default for SpidevConfig {
    fn default() -> Self {
        Self {
            mode: 3,
            bits_per_word: 8,
            max_speed_hz: 4_000_000,
        }
    }
}

/// Linux userspace SPI device (`/dev/spidevB.C`).
pub struct Spidev {
    file: File,
    path: PathBuf,
    config: SpidevConfig,
}

impl Spidev {
    /// Open a spidev node and apply `config`.
    pub fn open(path: impl AsRef<Path>, config: SpidevConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| BusError::Open {
                path: path.clone(),
                source: e,
            })?;

        let dev = Self { file, path, config };
        dev.write_u8(SPI_IOC_WR_MODE, dev.config.mode)?;
        dev.write_u8(SPI_IOC_WR_BITS_PER_WORD, dev.config.bits_per_word)?;
        dev.write_u32(SPI_IOC_WR_MAX_SPEED_HZ, dev.config.max_speed_hz)?;

        info!(
            path = ?dev.path,
            mode = dev.config.mode,
            speed_hz = dev.config.max_speed_hz,
            "opened spidev"
        );
        Ok(dev)
    }

    /// The device node this bus was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Settings applied at open.
    pub fn config(&self) -> &SpidevConfig {
        &self.config
    }

    fn write_u8(&self, request: u32, value: u8) -> Result<()> {
        // SAFETY: `request` is a spidev write request taking a pointer to a
        // u8, and `value` outlives the call.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, &value as *const u8) };
        check(rc)
    }

    fn write_u32(&self, request: u32, value: u32) -> Result<()> {
        // SAFETY: `request` is a spidev write request taking a pointer to a
        // u32, and `value` outlives the call.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, &value as *const u32) };
        check(rc)
    }
}

fn check(rc: libc::c_int) -> Result<()> {
    if rc < 0 {
        Err(BusError::Io(std::io::Error::last_os_error()))
    } else {
        Ok(())
    }
}

impl SpiTransfer for Spidev {
    fn transfer_in_place(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        let len = u32::try_from(buf.len())
            .map_err(|_| BusError::Fault(format!("transfer too long: {} bytes", buf.len())))?;
        let ptr = buf.as_mut_ptr() as u64;
        let xfer = SpiIocTransfer {
            tx_buf: ptr,
            rx_buf: ptr,
            len,
            speed_hz: self.config.max_speed_hz,
            bits_per_word: self.config.bits_per_word,
            ..SpiIocTransfer::default()
        };

        let start = Instant::now();
        // SAFETY: `xfer` points tx and rx at `buf`, which is valid for `len`
        // bytes for the duration of the call. spidev copies through kernel
        // bounce buffers, so aliasing tx and rx is permitted.
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                SPI_IOC_MESSAGE_1 as _,
                &xfer as *const SpiIocTransfer,
            )
        };
        check(rc)?;

        let elapsed = start.elapsed();
        if elapsed > timeout {
            debug!(?elapsed, ?timeout, "spidev transfer overran timeout");
            return Err(BusError::Timeout(timeout));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Spidev {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spidev")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish()
    }
}
