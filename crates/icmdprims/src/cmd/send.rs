use std::fs;

use crate::backend::{open_host, BusArgs};
use crate::cmd::{slot_arg, SendArgs};
use crate::exit::{host_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_sent, OutputFormat};

pub fn run(args: SendArgs, bus: &BusArgs, format: OutputFormat) -> CliResult<i32> {
    let slot = slot_arg(args.slot)?;
    let payload = resolve_payload(&args)?;
    let mut host = open_host(bus)?;

    host.send(slot, &payload)
        .map_err(|err| host_error("send failed", err))?;

    tracing::info!(slot = slot.get(), size = payload.len(), "send done");
    print_sent(slot.get(), payload.len(), format);
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(encoded) = &args.hex {
        let compact: String = encoded.split_whitespace().collect();
        return hex::decode(compact)
            .map_err(|err| CliError::new(DATA_INVALID, format!("--hex is not valid hex: {err}")));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SendArgs {
        SendArgs {
            slot: 0,
            data: None,
            hex: None,
            file: None,
        }
    }

    #[test]
    fn hex_payload_ignores_whitespace() {
        let args = SendArgs {
            hex: Some("00 01\t0a ff".to_string()),
            ..args()
        };
        assert_eq!(resolve_payload(&args).unwrap(), vec![0x00, 0x01, 0x0a, 0xff]);
    }

    #[test]
    fn bad_hex_is_invalid_data() {
        let args = SendArgs {
            hex: Some("zz".to_string()),
            ..args()
        };
        assert_eq!(resolve_payload(&args).unwrap_err().code, DATA_INVALID);
    }

    #[test]
    fn no_payload_sends_empty_frame() {
        assert!(resolve_payload(&args()).unwrap().is_empty());
    }
}
