use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use icmdprims_frame::{IntoSlotId, SlotId};

use crate::backend::BusArgs;
use crate::exit::{host_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod bufsize;
pub mod echo;
pub mod fw_version;
pub mod recv;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Query how many bytes a peer buffer slot holds.
    Bufsize(BufsizeArgs),
    /// Receive bytes from a peer buffer slot.
    Recv(RecvArgs),
    /// Send bytes to a peer buffer slot.
    Send(SendArgs),
    /// Read the peer firmware version (slot 2, reserved read).
    FwVersion(FwVersionArgs),
    /// Send to slot 0 and read the echo back from slot 1, repeatedly.
    Echo(EchoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, bus: &BusArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Bufsize(args) => bufsize::run(args, bus, format),
        Command::Recv(args) => recv::run(args, bus, format),
        Command::Send(args) => send::run(args, bus, format),
        Command::FwVersion(args) => fw_version::run(args, bus, format),
        Command::Echo(args) => echo::run(args, bus, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct BufsizeArgs {
    /// Buffer slot id (0..=31).
    #[arg(allow_negative_numbers = true)]
    pub slot: i64,
}

#[derive(Args, Debug)]
pub struct RecvArgs {
    /// Buffer slot id (0..=31).
    #[arg(allow_negative_numbers = true)]
    pub slot: i64,
    /// Frame capacity including the 3-byte header. Default: query the slot
    /// and read everything available.
    #[arg(long)]
    pub capacity: Option<usize>,
    /// Set the lock flag so the peer treats the read as exclusive.
    #[arg(long)]
    pub lock: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Buffer slot id (0..=31).
    #[arg(allow_negative_numbers = true)]
    pub slot: i64,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex-encoded payload (e.g. 000102ff).
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct FwVersionArgs {}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Number of send/receive rounds; 0 runs until interrupted.
    #[arg(long, default_value_t = 10)]
    pub count: usize,
    /// Pause between send and receive (e.g. 10ms).
    #[arg(long, default_value = "10ms")]
    pub delay: String,
    /// Payload bytes per round.
    #[arg(
        long,
        default_value_t = 16,
        value_parser = clap::value_parser!(u16).range(1..=0x3FFF)
    )]
    pub size: u16,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Range-check a slot id before any bus is opened.
pub fn slot_arg(raw: i64) -> CliResult<SlotId> {
    raw.into_slot_id()
        .map_err(|err| host_error("bad slot", err.into()))
}

/// Parse `500ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}
