use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scopelink_frame::{max_payload_for, FrameError, PacketConfig, PacketReader};
use scopelink_transport::Direction;
use tracing::info;

use crate::cmd::{connect_endpoint, parse_retry, ListenArgs};
use crate::exit::{frame_error, CliError, CliResult, SUCCESS};
use crate::output::{print_packet, OutputFormat};

/// Read timeout so a Ctrl-C is noticed while the bridge is quiet.
const POLL_TIMEOUT: Duration = Duration::from_millis(250);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = args.endpoint.endpoint(Direction::Tx);
    let retry_for = parse_retry(args.retry_for.as_deref())?;
    let stream = connect_endpoint(&endpoint, retry_for)?;

    let config = PacketConfig {
        max_payload_size: max_payload_for(args.buffer_capacity),
        read_timeout: Some(POLL_TIMEOUT),
        ..PacketConfig::default()
    };
    let mut reader = PacketReader::with_config_ipc(stream, config)
        .map_err(|err| frame_error("connect failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let label = endpoint.address();
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let packet = match reader.read_packet() {
            Ok(packet) => packet,
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue
            }
            Err(FrameError::ConnectionClosed) => {
                info!(address = %label, "bridge closed the channel");
                break;
            }
            Err(err) => return Err(frame_error("receive failed", err)),
        };

        print_packet(&packet, &label, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                return Ok(SUCCESS);
            }
        }
    }

    Ok(SUCCESS)
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
