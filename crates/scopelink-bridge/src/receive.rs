use std::sync::PoisonError;
use std::time::Duration;

use bytes::Bytes;
use scopelink_frame::{Packet, PacketHeader, HEADER_SIZE};
use scopelink_transport::{ChannelTransport, Endpoint, NativeChannel, TransportError};
use tracing::{debug, error, info, warn};

use crate::config::{BridgeConfig, OversizePolicy};
use crate::engine::{EngineCore, EngineState, WorkerCtx, WorkerExit};
use crate::error::{BridgeError, Result};
use crate::handler::{shared, PacketHandler, SharedHandler};

/// Inbound direction: reads frames from the connected peer and hands each
/// reconstructed packet to a [`PacketHandler`].
///
/// The handler runs on the worker thread under its own lock. A declared
/// payload larger than the buffer never causes a read past
/// [`BridgeConfig::max_payload`]; see [`OversizePolicy`].
pub struct ReceiveEngine<T: ChannelTransport = NativeChannel> {
    core: EngineCore<T>,
    handler: SharedHandler,
    config: BridgeConfig,
}

impl ReceiveEngine<NativeChannel> {
    /// Engine over the platform's native channel.
    pub fn new(endpoint: Endpoint, handler: impl PacketHandler, config: BridgeConfig) -> Self {
        Self::with_transport(endpoint, handler, config)
    }
}

impl<T: ChannelTransport> ReceiveEngine<T> {
    /// Engine over an explicit transport implementation.
    pub fn with_transport(
        endpoint: Endpoint,
        handler: impl PacketHandler,
        config: BridgeConfig,
    ) -> Self {
        Self {
            core: EngineCore::new("receive", endpoint, config.channel_options()),
            handler: shared(handler),
            config,
        }
    }

    /// Bind the endpoint and start the worker. Restarts a running engine.
    pub fn start(&mut self) -> Result<()> {
        self.config.validate()?;
        let handler = SharedHandler::clone(&self.handler);
        let config = self.config.clone();
        self.core
            .start(move |channel: &mut T, ctx| receive_loop(channel, ctx, &handler, &config))
    }

    /// Stop the worker and release the endpoint. Safe to call repeatedly.
    pub fn stop(&mut self) -> Result<()> {
        self.core.stop()
    }

    pub fn state(&self) -> EngineState {
        self.core.state()
    }

    /// Why the last joined worker ended.
    pub fn last_exit(&self) -> Option<WorkerExit> {
        self.core.last_exit()
    }

    /// Whether a worker thread is alive.
    pub fn is_active(&self) -> bool {
        self.core.is_active()
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.core.endpoint()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl<T: ChannelTransport> std::fmt::Debug for ReceiveEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveEngine")
            .field("endpoint", &self.core.endpoint().address())
            .field("state", &self.core.state())
            .finish()
    }
}

enum Fill {
    Complete,
    /// Peer hung up after this many bytes.
    Closed(usize),
    Cancelled,
}

/// Fill `buf`, retrying timeouts while the engine is still running.
fn fill<T: ChannelTransport>(
    channel: &mut T,
    ctx: &WorkerCtx,
    buf: &mut [u8],
    retry_delay: Duration,
) -> std::result::Result<Fill, TransportError> {
    loop {
        if !ctx.is_running() {
            return Ok(Fill::Cancelled);
        }
        match channel.read_exact(buf) {
            Ok(n) if n == buf.len() => return Ok(Fill::Complete),
            Ok(n) => return Ok(Fill::Closed(n)),
            Err(TransportError::TransientRetry) => std::thread::sleep(retry_delay),
            Err(err) => return Err(err),
        }
    }
}

fn read_failed(ctx: &WorkerCtx, err: TransportError) -> WorkerExit {
    if err.is_disconnect() {
        info!(error = %err, "peer disconnected");
        ctx.disconnect_exit()
    } else {
        error!(error = %err, "read failed");
        WorkerExit::Fatal(err.to_string())
    }
}

fn receive_loop<T: ChannelTransport>(
    channel: &mut T,
    ctx: &WorkerCtx,
    handler: &SharedHandler,
    config: &BridgeConfig,
) -> WorkerExit {
    let max_payload = config.max_payload();
    let mut header_buf = [0u8; HEADER_SIZE];
    let mut payload_buf = vec![0u8; max_payload];

    while ctx.is_running() {
        match fill(channel, ctx, &mut header_buf, config.poll_interval) {
            Ok(Fill::Complete) => {}
            Ok(Fill::Closed(got)) => {
                if got > 0 {
                    warn!(got, "peer hung up mid-header");
                }
                info!(address = %channel.endpoint(), "peer disconnected");
                return ctx.disconnect_exit();
            }
            Ok(Fill::Cancelled) => return WorkerExit::Stopped,
            Err(err) => return read_failed(ctx, err),
        }

        let header = PacketHeader::decode(&header_buf);
        let size = header.data_size as usize;

        let payload = if size > max_payload {
            let err = BridgeError::OversizePayload {
                declared: size,
                max: max_payload,
            };
            match config.oversize {
                OversizePolicy::Placeholder => {
                    warn!(
                        packet_id = header.packet_id,
                        command = header.command,
                        error = %err,
                        "substituting placeholder payload"
                    );
                    Bytes::from_static(&[0])
                }
                OversizePolicy::Disconnect => {
                    error!(packet_id = header.packet_id, error = %err, "closing channel");
                    return WorkerExit::Fatal(err.to_string());
                }
            }
        } else {
            let buf = &mut payload_buf[..size];
            match fill(channel, ctx, buf, config.poll_interval) {
                Ok(Fill::Complete) => Bytes::copy_from_slice(buf),
                Ok(Fill::Closed(got)) => {
                    warn!(expected = size, got, "peer hung up mid-payload");
                    return ctx.disconnect_exit();
                }
                Ok(Fill::Cancelled) => return WorkerExit::Stopped,
                Err(err) => return read_failed(ctx, err),
            }
        };

        let packet = Packet::new(header.command, header.packet_id, payload);
        debug!(
            packet_id = packet.packet_id,
            command = packet.command,
            data_size = packet.payload.len(),
            "received packet"
        );
        handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle(packet);
    }
    WorkerExit::Stopped
}
