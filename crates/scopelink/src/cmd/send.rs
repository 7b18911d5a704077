use std::fs;

use scopelink_frame::{max_payload_for, PacketConfig, PacketWriter};
use scopelink_transport::Direction;
use tracing::info;

use crate::cmd::{connect_endpoint, parse_retry, SendArgs};
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};

pub fn run(args: SendArgs) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let max_payload = max_payload_for(args.buffer_capacity);
    if payload.len() > max_payload {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "payload of {} bytes exceeds maximum {max_payload}",
                payload.len()
            ),
        ));
    }

    let endpoint = args.endpoint.endpoint(Direction::Rx);
    let retry_for = parse_retry(args.retry_for.as_deref())?;
    let stream = connect_endpoint(&endpoint, retry_for)?;

    let config = PacketConfig {
        max_payload_size: max_payload,
        ..PacketConfig::default()
    };
    let mut writer = PacketWriter::with_config_ipc(stream, config)
        .map_err(|err| frame_error("connect failed", err))?;
    writer
        .send(args.command, args.id, &payload)
        .map_err(|err| frame_error("send failed", err))?;

    info!(
        address = %endpoint,
        command = args.command,
        packet_id = args.id,
        data_size = payload.len(),
        "packet sent"
    );
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(digits) = &args.hex {
        return decode_hex(digits).map_err(|err| {
            CliError::new(USAGE, format!("--hex is not valid hex ({err}): {digits:?}"))
        });
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

/// Hex digits with any whitespace between them, e.g. `"0102 0304"`.
fn decode_hex(input: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let digits: String = input.split_whitespace().collect();
    hex::decode(digits)
}
