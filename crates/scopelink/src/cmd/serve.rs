use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scopelink_bridge::{Bridge, BridgeConfig, PacketQueue, WorkerExit};
use scopelink_frame::Packet;
use tracing::{info, warn};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{bridge_error, CliError, CliResult, SUCCESS};
use crate::output::{print_packet, OutputFormat};

const IDLE_WAIT: Duration = Duration::from_millis(50);

/// The packet `--demo` queues.
pub fn demo_packet() -> Packet {
    Packet::new(1, 0x0808, vec![0x01u8, 0x02, 0x03, 0x04, 0x05])
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = bridge_config(&args)?;
    config
        .validate()
        .map_err(|err| bridge_error("invalid configuration", err))?;

    let outbound = PacketQueue::new();
    let inbound = PacketQueue::new();
    let mut bridge = Bridge::with_config(
        args.endpoint.name.clone(),
        outbound.clone(),
        inbound.clone(),
        config,
    );

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let send = !args.receive_only;
    let receive = !args.send_only;
    if send {
        bridge
            .start_send()
            .map_err(|err| bridge_error("send endpoint failed", err))?;
        info!(address = %bridge.tx_endpoint(), "send endpoint ready");
    }
    if receive {
        bridge
            .start_receive()
            .map_err(|err| bridge_error("receive endpoint failed", err))?;
        info!(address = %bridge.rx_endpoint(), "receive endpoint ready");
    }
    if args.demo {
        outbound.enqueue(demo_packet());
    }

    let rx_address = bridge.rx_endpoint().address();
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        if let Some(packet) = inbound.dequeue_timeout(IDLE_WAIT) {
            print_packet(&packet, &rx_address, format);
            printed = printed.saturating_add(1);
            if args.count.is_some_and(|count| printed >= count) {
                break;
            }
            continue;
        }

        if args.restart {
            if send && !bridge.transmit().is_active() {
                bridge
                    .stop_send()
                    .map_err(|err| bridge_error("send endpoint failed", err))?;
                if bridge.send_exit() == Some(WorkerExit::Disconnected) {
                    info!(address = %bridge.tx_endpoint(), "peer left; rebinding");
                    bridge
                        .start_send()
                        .map_err(|err| bridge_error("send endpoint failed", err))?;
                }
            }
            if receive && !bridge.receive().is_active() {
                bridge
                    .stop_receive()
                    .map_err(|err| bridge_error("receive endpoint failed", err))?;
                if bridge.receive_exit() == Some(WorkerExit::Disconnected) {
                    info!(address = %bridge.rx_endpoint(), "peer left; rebinding");
                    bridge
                        .start_receive()
                        .map_err(|err| bridge_error("receive endpoint failed", err))?;
                }
            }
        }
        // With --restart only a peer hang-up is rebound; any other exit ends
        // the direction for good.
        if !bridge.transmit().is_active() && !bridge.receive().is_active() {
            warn!(name = %bridge.name(), "no direction is running; exiting");
            break;
        }
    }

    if !outbound.is_empty() {
        warn!(dropped = outbound.len(), "unsent packets discarded");
    }
    bridge
        .stop()
        .map_err(|err| bridge_error("shutdown failed", err))?;
    Ok(SUCCESS)
}

fn bridge_config(args: &ServeArgs) -> CliResult<BridgeConfig> {
    let read_timeout = args
        .read_timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?;
    Ok(BridgeConfig::default()
        .with_base_path(args.endpoint.base_path.clone())
        .with_buffer_capacity(args.buffer_capacity)
        .with_read_timeout(read_timeout)
        .with_write_failure(args.write_failure.into())
        .with_oversize(args.oversize.into()))
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
