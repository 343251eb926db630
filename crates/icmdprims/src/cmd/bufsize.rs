use crate::backend::{open_host, BusArgs};
use crate::cmd::{slot_arg, BufsizeArgs};
use crate::exit::{host_error, CliResult, SUCCESS};
use crate::output::{print_size, OutputFormat};

pub fn run(args: BufsizeArgs, bus: &BusArgs, format: OutputFormat) -> CliResult<i32> {
    let slot = slot_arg(args.slot)?;
    let mut host = open_host(bus)?;
    let size = host
        .query_buffer_size(slot)
        .map_err(|err| host_error("size query failed", err))?;

    print_size(slot.get(), size, format);
    Ok(SUCCESS)
}
