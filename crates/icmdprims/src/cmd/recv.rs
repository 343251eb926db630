use crate::backend::{open_host, BusArgs};
use crate::cmd::{slot_arg, RecvArgs};
use crate::exit::{host_error, CliResult, SUCCESS};
use crate::output::{print_payload, OutputFormat};

pub fn run(args: RecvArgs, bus: &BusArgs, format: OutputFormat) -> CliResult<i32> {
    let slot = slot_arg(args.slot)?;
    let mut host = open_host(bus)?;
    let payload = match args.capacity {
        Some(capacity) => host.receive(slot, capacity, args.lock),
        None => host.read_slot(slot, args.lock),
    }
    .map_err(|err| host_error("receive failed", err))?;

    tracing::debug!(slot = slot.get(), size = payload.len(), "received payload");
    print_payload(slot.get(), &payload, args.lock, format);
    Ok(SUCCESS)
}
