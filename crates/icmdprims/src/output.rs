use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct SizeOutput {
    slot: u8,
    size: u16,
}

pub fn print_size(slot: u8, size: u16, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&SizeOutput { slot, size }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["SLOT", "AVAILABLE"])
                .add_row(vec![slot.to_string(), size.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("bufid[{slot}] size = {size}"),
        OutputFormat::Raw => println!("{size}"),
    }
}

#[derive(Serialize)]
struct PayloadOutput<'a> {
    slot: u8,
    size: usize,
    locked: bool,
    hex: String,
    text: Option<&'a str>,
}

pub fn print_payload(slot: u8, payload: &[u8], locked: bool, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&PayloadOutput {
            slot,
            size: payload.len(),
            locked,
            hex: hex::encode(payload),
            text: std::str::from_utf8(payload).ok(),
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SLOT", "SIZE", "LOCKED", "PAYLOAD"])
                .add_row(vec![
                    slot.to_string(),
                    payload.len().to_string(),
                    locked.to_string(),
                    payload_preview(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", hex_bytes(payload)),
        OutputFormat::Raw => print_raw(payload),
    }
}

#[derive(Serialize)]
struct SendOutput {
    slot: u8,
    size: usize,
    sent: bool,
}

pub fn print_sent(slot: u8, size: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&SendOutput {
            slot,
            size,
            sent: true,
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Send done ({size} bytes to slot {slot}).")
        }
        OutputFormat::Raw => {}
    }
}

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    size: usize,
}

pub fn print_fw_version(version: &str, size: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&VersionOutput { version, size }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["VERSION", "BUFFER SIZE"])
                .add_row(vec![version.to_string(), size.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("version={version} (buff size={size})"),
        OutputFormat::Raw => println!("{version}"),
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Space-separated lowercase hex, one leading space per byte.
pub fn hex_bytes(data: &[u8]) -> String {
    data.iter().map(|b| format!(" {b:02x}")).collect()
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => hex::encode(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_bytes_matches_console_layout() {
        assert_eq!(hex_bytes(&[0x00, 0x0f, 0xa0]), " 00 0f a0");
        assert_eq!(hex_bytes(&[]), "");
    }

    #[test]
    fn preview_falls_back_to_hex_for_binary() {
        assert_eq!(payload_preview(b"v1.0"), "v1.0");
        assert_eq!(payload_preview(&[0x00, 0x01]), "0001");
    }
}
