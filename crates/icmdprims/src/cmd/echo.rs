use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use icmdprims_bus::{ChipSelect, SpiTransfer};
use icmdprims_frame::SlotId;
use icmdprims_host::HostInterface;
use serde::Serialize;

use crate::backend::{open_host, BusArgs};
use crate::cmd::{parse_duration, EchoArgs};
use crate::exit::{host_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{hex_bytes, print_json, OutputFormat};

/// Slot the peer accepts echo payloads on.
const ECHO_TX_SLOT: SlotId = match SlotId::new(0) {
    Ok(slot) => slot,
    Err(_) => panic!("echo tx slot out of range"),
};

/// Slot the peer returns echo payloads on.
const ECHO_RX_SLOT: SlotId = match SlotId::new(1) {
    Ok(slot) => slot,
    Err(_) => panic!("echo rx slot out of range"),
};

#[derive(Serialize)]
struct RoundOutput {
    round: usize,
    tx_available: u16,
    sent: String,
    received: String,
    matched: bool,
}

#[derive(Serialize)]
struct SummaryOutput {
    rounds: usize,
    mismatches: usize,
}

struct Round {
    tx_available: u16,
    sent: Vec<u8>,
    received: Vec<u8>,
}

impl Round {
    fn matched(&self) -> bool {
        self.sent == self.received
    }
}

pub fn run(args: EchoArgs, bus: &BusArgs, format: OutputFormat) -> CliResult<i32> {
    let delay = parse_duration(&args.delay)?;
    let mut host = open_host(bus)?;

    let running = Arc::new(AtomicBool::new(true));
    if args.count == 0 {
        install_ctrlc_handler(running.clone())?;
    }

    let mut rounds = 0usize;
    let mut mismatches = 0usize;

    while running.load(Ordering::SeqCst) && (args.count == 0 || rounds < args.count) {
        let round = echo_round(&mut host, rounds, args.size, delay)?;
        if !round.matched() {
            mismatches += 1;
            tracing::warn!(round = rounds, "echo payload mismatch");
        }
        print_round(rounds, &round, format);
        rounds += 1;
    }

    print_summary(rounds, mismatches, format);
    if mismatches > 0 {
        return Ok(FAILURE);
    }
    Ok(SUCCESS)
}

fn echo_round<T, C>(
    host: &mut HostInterface<T, C>,
    round: usize,
    size: u16,
    delay: Duration,
) -> CliResult<Round>
where
    T: SpiTransfer,
    C: ChipSelect,
{
    let tx_available = host
        .query_buffer_size(ECHO_TX_SLOT)
        .map_err(|err| host_error("tx size query failed", err))?;

    let sent = pattern(round, size);
    host.send(ECHO_TX_SLOT, &sent)
        .map_err(|err| host_error("send data failed", err))?;

    if !delay.is_zero() {
        thread::sleep(delay);
    }

    let received = host
        .read_slot(ECHO_RX_SLOT, false)
        .map_err(|err| host_error("receive data failed", err))?;

    tracing::debug!(round, size = sent.len(), received = received.len(), "echo round");
    Ok(Round {
        tx_available,
        sent,
        received: received.to_vec(),
    })
}

/// Incrementing bytes, offset by the round number so stale data is caught.
fn pattern(round: usize, size: u16) -> Vec<u8> {
    let base = round as u8;
    (0..usize::from(size))
        .map(|i| (i as u8).wrapping_add(base))
        .collect()
}

fn print_round(round: usize, result: &Round, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(&RoundOutput {
            round,
            tx_available: result.tx_available,
            sent: hex::encode(&result.sent),
            received: hex::encode(&result.received),
            matched: result.matched(),
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("[{round}] tx available = {}", result.tx_available);
            println!("  sent    ={}", hex_bytes(&result.sent));
            println!("  received={}", hex_bytes(&result.received));
            if !result.matched() {
                println!("  MISMATCH");
            }
        }
    }
}

fn print_summary(rounds: usize, mismatches: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(&SummaryOutput { rounds, mismatches }),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("{rounds} rounds, {mismatches} mismatches");
        }
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use icmdprims_host::{Fault, SimulatedPeer, DEFAULT_SIM_VERSION};

    use super::*;
    use crate::exit::{TIMEOUT, TRANSPORT_ERROR};

    fn sim_host() -> (SimulatedPeer, HostInterface<SimulatedPeer, SimulatedPeer>) {
        let peer = SimulatedPeer::loopback(DEFAULT_SIM_VERSION);
        let host = HostInterface::new(peer.clone(), peer.clone());
        (peer, host)
    }

    #[test]
    fn pattern_wraps_and_shifts_per_round() {
        assert_eq!(pattern(0, 4), vec![0, 1, 2, 3]);
        assert_eq!(pattern(3, 3), vec![3, 4, 5]);
        assert_eq!(pattern(255, 2), vec![255, 0]);
    }

    #[test]
    fn round_against_loopback_matches() {
        let (peer, mut host) = sim_host();
        for i in 0..3 {
            let round = echo_round(&mut host, i, 16, Duration::ZERO).unwrap();
            assert!(round.matched());
            assert_eq!(round.received.len(), 16);
        }
        assert_eq!(peer.available(ECHO_RX_SLOT), 0);
        assert!(!peer.is_selected());
    }

    #[test]
    fn unrouted_echo_is_reported_as_receive_failure() {
        // Writes land in slot 5, so slot 1 is never mapped.
        let peer = SimulatedPeer::new().with_loopback(ECHO_TX_SLOT, SlotId::new(5).unwrap(), 64);
        let mut host = HostInterface::new(peer.clone(), peer);
        let err = echo_round(&mut host, 0, 4, Duration::ZERO).err().unwrap();
        assert_eq!(err.code, FAILURE);
        assert!(err.message.starts_with("receive data failed"));
    }

    #[test]
    fn bus_fault_on_query_is_transport_error() {
        let (peer, mut host) = sim_host();
        peer.inject(Fault::Bus);
        let err = echo_round(&mut host, 0, 4, Duration::ZERO).err().unwrap();
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(!peer.is_selected());
    }

    #[test]
    fn timeout_on_query_maps_to_timeout_code() {
        let (peer, mut host) = sim_host();
        peer.inject(Fault::Timeout);
        let err = echo_round(&mut host, 0, 4, Duration::ZERO).err().unwrap();
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("tx size query failed"));
    }
}
