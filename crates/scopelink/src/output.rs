use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use scopelink_frame::Packet;
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
struct PacketOutput<'a> {
    endpoint: &'a str,
    command: u16,
    packet_id: u16,
    data_size: usize,
    data: String,
    timestamp: String,
}

/// Print one packet; `endpoint` names where it was read.
pub fn print_packet(packet: &Packet, endpoint: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                endpoint,
                command: packet.command,
                packet_id: packet.packet_id,
                data_size: packet.payload.len(),
                data: hex::encode(&packet.payload),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ENDPOINT", "COMMAND", "PACKET ID", "SIZE", "DATA"])
                .add_row(vec![
                    endpoint.to_string(),
                    packet.command.to_string(),
                    format!("{:#06x}", packet.packet_id),
                    packet.payload.len().to_string(),
                    hex::encode(&packet.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{endpoint}: {packet:?}");
        }
        OutputFormat::Raw => {
            print_raw(packet.payload.as_ref());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
