use icmdprims_host::{decode_text, VERSION_SLOT};

use crate::backend::{open_host, BusArgs};
use crate::cmd::FwVersionArgs;
use crate::exit::{host_error, CliResult, SUCCESS};
use crate::output::{print_fw_version, OutputFormat};

pub fn run(_args: FwVersionArgs, bus: &BusArgs, format: OutputFormat) -> CliResult<i32> {
    let mut host = open_host(bus)?;
    let raw = host
        .read_slot(VERSION_SLOT, true)
        .map_err(|err| host_error("version read failed", err))?;
    let version = decode_text(&raw);

    tracing::info!(%version, size = raw.len(), "peer firmware version");
    print_fw_version(&version, raw.len(), format);
    Ok(SUCCESS)
}
