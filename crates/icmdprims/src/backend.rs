use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};
use icmdprims_bus::{BusConfig, ChipSelect, KernelSelect, SpiTransfer};
#[cfg(target_os = "linux")]
use icmdprims_bus::{Spidev, SpidevConfig, SysfsGpio, SPI_NO_CS};
use icmdprims_host::{HostConfig, HostInterface, SimulatedPeer, DEFAULT_SIM_VERSION};

use crate::cmd::parse_duration;
use crate::exit::CliResult;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum BusKind {
    /// In-process simulated peer (loopback on slots 0/1, version on slot 2).
    Sim,
    /// Linux userspace SPI device.
    Spidev,
}

/// Bus selection shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct BusArgs {
    /// Bus backend.
    #[arg(
        long = "bus",
        value_name = "KIND",
        default_value = "spidev",
        env = "ICMD_BUS",
        global = true
    )]
    pub kind: BusKind,

    /// spidev device node.
    #[arg(
        long,
        value_name = "PATH",
        default_value = "/dev/spidev0.0",
        env = "ICMD_DEVICE",
        global = true
    )]
    pub device: PathBuf,

    /// GPIO driving chip-select (active low). Without it the SPI controller
    /// drives CS for each transfer.
    #[arg(long, value_name = "PIN", env = "ICMD_CS_GPIO", global = true)]
    pub cs_gpio: Option<u32>,

    /// SPI clock ceiling in Hz.
    #[arg(
        long,
        value_name = "HZ",
        default_value_t = 4_000_000,
        env = "ICMD_SPEED_HZ",
        global = true
    )]
    pub speed_hz: u32,

    /// SPI mode (0-3).
    #[arg(
        long,
        value_name = "MODE",
        default_value_t = 3,
        value_parser = clap::value_parser!(u8).range(0..=3),
        env = "ICMD_SPI_MODE",
        global = true
    )]
    pub spi_mode: u8,

    /// Per-exchange timeout (e.g. 1000ms, 2s).
    #[arg(
        long,
        value_name = "DURATION",
        default_value = "1000ms",
        env = "ICMD_TIMEOUT",
        global = true
    )]
    pub timeout: String,

    /// Version string served by the simulated peer.
    #[arg(long, value_name = "STRING", default_value = DEFAULT_SIM_VERSION, global = true)]
    pub sim_version: String,
}

/// Transfer primitive selected at startup.
pub enum BackendSpi {
    Sim(SimulatedPeer),
    #[cfg(target_os = "linux")]
    Spidev(Spidev),
}

/// Chip-select line selected at startup.
pub enum BackendSelect {
    Sim(SimulatedPeer),
    Kernel(KernelSelect),
    #[cfg(target_os = "linux")]
    Gpio(SysfsGpio),
}

impl SpiTransfer for BackendSpi {
    fn transfer_in_place(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> icmdprims_bus::Result<()> {
        match self {
            BackendSpi::Sim(peer) => peer.transfer_in_place(buf, timeout),
            #[cfg(target_os = "linux")]
            BackendSpi::Spidev(dev) => dev.transfer_in_place(buf, timeout),
        }
    }
}

impl ChipSelect for BackendSelect {
    fn assert_select(&mut self) -> icmdprims_bus::Result<()> {
        match self {
            BackendSelect::Sim(peer) => peer.assert_select(),
            BackendSelect::Kernel(line) => line.assert_select(),
            #[cfg(target_os = "linux")]
            BackendSelect::Gpio(pin) => pin.assert_select(),
        }
    }

    fn release_select(&mut self) -> icmdprims_bus::Result<()> {
        match self {
            BackendSelect::Sim(peer) => peer.release_select(),
            BackendSelect::Kernel(line) => line.release_select(),
            #[cfg(target_os = "linux")]
            BackendSelect::Gpio(pin) => pin.release_select(),
        }
    }
}

pub type Host = HostInterface<BackendSpi, BackendSelect>;

/// Build the host interface once for this process.
pub fn open_host(args: &BusArgs) -> CliResult<Host> {
    let config = HostConfig {
        bus: BusConfig {
            timeout: parse_duration(&args.timeout)?,
        },
        ..HostConfig::default()
    };

    let (spi, cs) = match args.kind {
        BusKind::Sim => {
            let peer = SimulatedPeer::loopback(&args.sim_version);
            tracing::debug!(version = %args.sim_version, "using simulated peer");
            (BackendSpi::Sim(peer.clone()), BackendSelect::Sim(peer))
        }
        BusKind::Spidev => open_spidev(args)?,
    };

    Ok(HostInterface::with_config(spi, cs, config))
}

#[cfg(target_os = "linux")]
fn open_spidev(args: &BusArgs) -> CliResult<(BackendSpi, BackendSelect)> {
    use crate::exit::bus_error;

    let mut mode = args.spi_mode;
    let cs = match args.cs_gpio {
        Some(pin) => {
            mode |= SPI_NO_CS;
            let gpio = SysfsGpio::open(pin)
                .map_err(|err| bus_error("chip-select setup failed", err))?;
            BackendSelect::Gpio(gpio)
        }
        None => BackendSelect::Kernel(KernelSelect),
    };

    let config = SpidevConfig {
        mode,
        max_speed_hz: args.speed_hz,
        ..SpidevConfig::default()
    };
    let spi = Spidev::open(&args.device, config).map_err(|err| bus_error("bus open failed", err))?;
    Ok((BackendSpi::Spidev(spi), cs))
}

#[cfg(not(target_os = "linux"))]
fn open_spidev(_args: &BusArgs) -> CliResult<(BackendSpi, BackendSelect)> {
    Err(crate::exit::CliError::new(
        crate::exit::USAGE,
        "the spidev backend is only available on Linux",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim_args() -> BusArgs {
        BusArgs {
            kind: BusKind::Sim,
            device: PathBuf::from("/dev/null"),
            cs_gpio: None,
            speed_hz: 1_000_000,
            spi_mode: 0,
            timeout: "250ms".to_string(),
            sim_version: "test-fw".to_string(),
        }
    }

    #[test]
    fn sim_backend_serves_version() {
        let mut host = open_host(&sim_args()).unwrap();
        assert_eq!(host.firmware_version().unwrap(), "test-fw");
        assert_eq!(host.bus().timeout(), Duration::from_millis(250));
    }

    #[test]
    fn invalid_timeout_is_usage_error() {
        let args = BusArgs {
            timeout: "soon".to_string(),
            ..sim_args()
        };
        let err = open_host(&args).err().unwrap();
        assert_eq!(err.code, crate::exit::USAGE);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn missing_spidev_is_transport_error() {
        let args = BusArgs {
            kind: BusKind::Spidev,
            device: PathBuf::from("/dev/spidev-missing.7"),
            ..sim_args()
        };
        let err = open_host(&args).err().unwrap();
        assert_eq!(err.code, crate::exit::TRANSPORT_ERROR);
    }
}
