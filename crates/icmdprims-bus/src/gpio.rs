use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{BusError, Result};
use crate::traits::ChipSelect;

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Attempts made waiting for udev to grant access to a freshly exported pin.
const EXPORT_POLL_ATTEMPTS: usize = 20;
const EXPORT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Active-low chip-select driven through the sysfs GPIO interface.
pub struct SysfsGpio {
    pin: u32,
    value: File,
    value_path: PathBuf,
}

impl SysfsGpio {
    /// Export `pin` if needed, configure it as an output, and leave it high
    /// (released).
    pub fn open(pin: u32) -> Result<Self> {
        Self::open_at(SYSFS_GPIO_ROOT, pin)
    }

    /// Same as [`SysfsGpio::open`] with an alternate sysfs root.
    pub fn open_at(root: impl AsRef<Path>, pin: u32) -> Result<Self> {
        let root = root.as_ref();
        let pin_dir = root.join(format!("gpio{pin}"));

        if !pin_dir.exists() {
            debug!(pin, "exporting gpio");
            write_attr(&root.join("export"), pin.to_string().as_bytes())?;
        }

        // "high" sets output direction with the line already inactive.
        let direction = pin_dir.join("direction");
        let mut attempts = 0;
        loop {
            match write_attr(&direction, b"high") {
                Ok(()) => break,
                Err(err) if attempts < EXPORT_POLL_ATTEMPTS => {
                    debug!(pin, error = %err, "gpio direction not writable yet");
                    attempts += 1;
                    std::thread::sleep(EXPORT_POLL_INTERVAL);
                }
                Err(err) => return Err(err),
            }
        }

        let value_path = pin_dir.join("value");
        let value = OpenOptions::new()
            .write(true)
            .open(&value_path)
            .map_err(|e| BusError::Open {
                path: value_path.clone(),
                source: e,
            })?;

        info!(pin, "chip-select gpio ready");
        Ok(Self {
            pin,
            value,
            value_path,
        })
    }

    /// The GPIO number driving chip-select.
    pub fn pin(&self) -> u32 {
        self.pin
    }

    fn drive(&mut self, level: &[u8]) -> Result<()> {
        self.value
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.value.write_all(level))
            .map_err(|e| {
                BusError::Select(format!("writing {}: {e}", self.value_path.display()))
            })
    }
}

fn write_attr(path: &Path, contents: &[u8]) -> Result<()> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|mut f| f.write_all(contents))
        .map_err(|e| BusError::Open {
            path: path.to_path_buf(),
            source: e,
        })
}

impl ChipSelect for SysfsGpio {
    fn assert_select(&mut self) -> Result<()> {
        self.drive(b"0")
    }

    fn release_select(&mut self) -> Result<()> {
        self.drive(b"1")
    }
}

impl std::fmt::Debug for SysfsGpio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysfsGpio").field("pin", &self.pin).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(tag: &str, pin: u32) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "icmdprims-gpio-{tag}-{}",
            std::process::id()
        ));
        let pin_dir = root.join(format!("gpio{pin}"));
        std::fs::create_dir_all(&pin_dir).unwrap();
        std::fs::write(root.join("export"), b"").unwrap();
        std::fs::write(pin_dir.join("direction"), b"in").unwrap();
        std::fs::write(pin_dir.join("value"), b"0").unwrap();
        root
    }

    #[test]
    fn open_configures_output_high() {
        let root = fake_sysfs("open", 17);

        let gpio = SysfsGpio::open_at(&root, 17).unwrap();
        assert_eq!(gpio.pin(), 17);
        let direction = std::fs::read_to_string(root.join("gpio17/direction")).unwrap();
        assert_eq!(direction, "high");

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn select_is_active_low() {
        let root = fake_sysfs("level", 5);
        let mut gpio = SysfsGpio::open_at(&root, 5).unwrap();
        let value = root.join("gpio5/value");

        gpio.assert_select().unwrap();
        assert_eq!(std::fs::read_to_string(&value).unwrap(), "0");

        gpio.release_select().unwrap();
        assert_eq!(std::fs::read_to_string(&value).unwrap(), "1");

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_root_fails_to_export() {
        let result = SysfsGpio::open_at("/nonexistent/icmdprims/gpio", 3);
        assert!(matches!(result, Err(BusError::Open { .. })));
    }
}
