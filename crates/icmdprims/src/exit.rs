use std::fmt;
use std::io;

use icmdprims_bus::BusError;
use icmdprims_host::HostError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn bus_error(context: &str, err: BusError) -> CliError {
    match err {
        BusError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        BusError::Open { ref source, .. } if source.kind() == io::ErrorKind::PermissionDenied => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        BusError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

/// Map a host failure to an exit code. The message keeps the failing stage
/// (allocation, bus, peer) so wiring faults read differently from protocol
/// mismatches.
pub fn host_error(context: &str, err: HostError) -> CliError {
    match err {
        HostError::InvalidSlot(_) | HostError::InvalidLength(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        HostError::AllocationFailure { .. } => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
        HostError::Bus(err) => bus_error(context, err),
        HostError::PeerRejected { .. } | HostError::EmptySlot(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        #[allow(unreachable_patterns)]
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use icmdprims_frame::{FrameError, SlotId};
    use icmdprims_host::Stage;

    use super::*;

    #[test]
    fn host_errors_map_to_distinct_codes() {
        let slot = SlotId::new(2).unwrap();
        let cases = [
            (HostError::InvalidSlot(40), USAGE),
            (
                HostError::InvalidLength(FrameError::CapacityTooSmall {
                    capacity: 1,
                    min: 3,
                }),
                USAGE,
            ),
            (HostError::AllocationFailure { size: 19 }, INTERNAL),
            (
                HostError::Bus(BusError::Timeout(Duration::from_secs(1))),
                TIMEOUT,
            ),
            (
                HostError::Bus(BusError::Fault("x".to_string())),
                TRANSPORT_ERROR,
            ),
            (
                HostError::PeerRejected {
                    stage: Stage::Receive,
                    slot,
                    status: 1,
                },
                FAILURE,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(host_error("op", err).code, code);
        }
    }

    #[test]
    fn message_names_the_stage() {
        let err = host_error(
            "fw-version failed",
            HostError::PeerRejected {
                stage: Stage::Query,
                slot: SlotId::new(2).unwrap(),
                status: 0x03,
            },
        );
        assert_eq!(
            err.message,
            "fw-version failed: peer rejected size query on slot 2 (status 0x03)"
        );
    }
}
