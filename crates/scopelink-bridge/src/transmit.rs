use bytes::BytesMut;
use scopelink_frame::encode_packet;
use scopelink_transport::{ChannelTransport, Endpoint, NativeChannel};
use tracing::{debug, error, info, warn};

use crate::config::{BridgeConfig, WriteFailurePolicy};
use crate::engine::{EngineCore, EngineState, WorkerCtx, WorkerExit};
use crate::error::{BridgeError, Result};
use crate::queue::PacketQueue;

/// Outbound direction: drains a [`PacketQueue`] onto the connected peer.
///
/// Packets leave in enqueue order, each as header plus payload in a single
/// write. The engine owns the consumer side of the queue only; producers
/// keep their own clone.
pub struct TransmitEngine<T: ChannelTransport = NativeChannel> {
    core: EngineCore<T>,
    queue: PacketQueue,
    config: BridgeConfig,
}

impl TransmitEngine<NativeChannel> {
    /// Engine over the platform's native channel.
    pub fn new(endpoint: Endpoint, queue: PacketQueue, config: BridgeConfig) -> Self {
        Self::with_transport(endpoint, queue, config)
    }
}

impl<T: ChannelTransport> TransmitEngine<T> {
    /// Engine over an explicit transport implementation.
    pub fn with_transport(endpoint: Endpoint, queue: PacketQueue, config: BridgeConfig) -> Self {
        Self {
            core: EngineCore::new("transmit", endpoint, config.channel_options()),
            queue,
            config,
        }
    }

    /// Bind the endpoint and start the worker. Restarts a running engine.
    ///
    /// Setup errors leave the engine stopped. The worker accepts its peer in
    /// the background; an accept failure shows up in [`last_exit`](Self::last_exit).
    pub fn start(&mut self) -> Result<()> {
        self.config.validate()?;
        let queue = self.queue.clone();
        let config = self.config.clone();
        self.core
            .start(move |channel: &mut T, ctx| transmit_loop(channel, ctx, &queue, &config))
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

    /// The queue this engine drains.
    pub fn queue(&self) -> &PacketQueue {
        &self.queue
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl<T: ChannelTransport> std::fmt::Debug for TransmitEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransmitEngine")
            .field("endpoint", &self.core.endpoint().address())
            .field("state", &self.core.state())
            .field("queued", &self.queue.len())
            .finish()
    }
}

fn transmit_loop<T: ChannelTransport>(
    channel: &mut T,
    ctx: &WorkerCtx,
    queue: &PacketQueue,
    config: &BridgeConfig,
) -> WorkerExit {
    let max_payload = config.max_payload();
    let mut scratch = BytesMut::with_capacity(config.buffer_capacity);

    while ctx.is_running() {
        let Some(packet) = queue.dequeue_timeout(config.poll_interval) else {
            continue;
        };

        scratch.clear();
        if let Err(err) = encode_packet(&packet, &mut scratch, max_payload) {
            warn!(
                packet_id = packet.packet_id,
                command = packet.command,
                error = %err,
                "dropping packet that does not fit the transmit buffer"
            );
            continue;
        }

        match channel.write_all(&scratch) {
            Ok(()) => debug!(
                packet_id = packet.packet_id,
                command = packet.command,
                bytes = scratch.len(),
                "sent packet"
            ),
            Err(err) if err.is_disconnect() => {
                info!(address = %channel.endpoint(), "peer disconnected");
                return ctx.disconnect_exit();
            }
            Err(err) => {
                let err = BridgeError::WriteFailed(err);
                match config.write_failure {
                    WriteFailurePolicy::Continue => warn!(
                        packet_id = packet.packet_id,
                        error = %err,
                        "packet dropped"
                    ),
                    WriteFailurePolicy::Disconnect => {
                        error!(packet_id = packet.packet_id, error = %err, "closing channel");
                        return WorkerExit::Fatal(err.to_string());
                    }
                }
            }
        }
    }
    WorkerExit::Stopped
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use scopelink_frame::{Packet, HEADER_SIZE};
    use scopelink_transport::Direction;

    use super::*;
    use crate::mock::{self, MockChannel, Script, MOCK_BASE};

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn mock_engine(
        name: &str,
        script: Script,
        config: BridgeConfig,
    ) -> (TransmitEngine<MockChannel>, mock::SharedScript, PacketQueue) {
        let endpoint = Endpoint::with_base(MOCK_BASE, name, Direction::Tx);
        let shared = mock::install(endpoint.address(), script);
        let queue = PacketQueue::new();
        let engine = TransmitEngine::<MockChannel>::with_transport(endpoint, queue.clone(), config);
        (engine, shared, queue)
    }

    #[test]
    fn writes_header_and_payload_in_one_write() {
        let (mut engine, script, queue) =
            mock_engine("tx-single", Script::default(), BridgeConfig::default());
        queue.enqueue(Packet::new(1, 0x0808, vec![1u8, 2, 3, 4, 5]));
        engine.start().unwrap();

        wait_for(|| !script.lock().unwrap().written.is_empty());
        engine.stop().unwrap();

        let written = script.lock().unwrap().written.clone();
        assert_eq!(
            written,
            vec![vec![0x01, 0x00, 0x08, 0x08, 0x05, 0x00, 1, 2, 3, 4, 5]]
        );
        assert_eq!(engine.last_exit(), Some(WorkerExit::Stopped));
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[test]
    fn write_failure_continue_keeps_draining() {
        let script = Script {
            failing_writes: vec![0],
            ..Script::default()
        };
        let (mut engine, script, queue) =
            mock_engine("tx-continue", script, BridgeConfig::default());
        for id in [1, 2] {
            queue.enqueue(Packet::new(0, id, vec![id as u8]));
        }
        engine.start().unwrap();

        wait_for(|| !script.lock().unwrap().written.is_empty());
        engine.stop().unwrap();

        let written = script.lock().unwrap().written.clone();
        assert_eq!(written.len(), 1);
        assert_eq!(&written[0][2..4], &2u16.to_le_bytes());
        assert_eq!(engine.last_exit(), Some(WorkerExit::Stopped));
    }

    #[test]
    fn write_failure_disconnect_ends_worker() {
        let script = Script {
            failing_writes: vec![0],
            ..Script::default()
        };
        let config = BridgeConfig::default().with_write_failure(WriteFailurePolicy::Disconnect);
        let (mut engine, script, queue) = mock_engine("tx-disconnect", script, config);
        queue.enqueue(Packet::new(0, 1, vec![1u8]));
        queue.enqueue(Packet::new(0, 2, vec![2u8]));
        engine.start().unwrap();

        wait_for(|| !engine.is_active());
        engine.stop().unwrap();

        assert!(matches!(engine.last_exit(), Some(WorkerExit::Fatal(_))));
        assert!(script.lock().unwrap().written.is_empty());
        // The second packet was never dequeued.
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn oversize_outbound_packet_is_dropped() {
        let config = BridgeConfig::default().with_buffer_capacity(HEADER_SIZE + 4);
        let (mut engine, script, queue) = mock_engine("tx-oversize", Script::default(), config);
        queue.enqueue(Packet::new(0, 1, vec![0u8; 5]));
        queue.enqueue(Packet::new(0, 2, vec![0u8; 4]));
        engine.start().unwrap();

        wait_for(|| !script.lock().unwrap().written.is_empty());
        engine.stop().unwrap();

        let written = script.lock().unwrap().written.clone();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].len(), HEADER_SIZE + 4);
    }

    #[test]
    fn invalid_config_is_rejected_before_bind() {
        let config = BridgeConfig::default().with_buffer_capacity(0);
        let (mut engine, _script, _queue) = mock_engine("tx-invalid", Script::default(), config);
        assert!(matches!(engine.start(), Err(BridgeError::InvalidConfig(_))));
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(!engine.is_active());
    }

    #[test]
    fn bind_failure_leaves_engine_stopped() {
        let endpoint = Endpoint::with_base(MOCK_BASE, "tx-unregistered", Direction::Tx);
        let mut engine = TransmitEngine::<MockChannel>::with_transport(
            endpoint,
            PacketQueue::new(),
            BridgeConfig::default(),
        );
        let err = engine.start().unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(engine.stop().is_ok());
    }

    #[cfg(unix)]
    mod unix {
        use std::io::Read;

        use scopelink_transport::connect;

        use super::*;

        fn test_config(tag: &str) -> BridgeConfig {
            let dir = std::path::PathBuf::from(format!(
                "/tmp/scl-tx-{}-{}-{}",
                tag,
                std::process::id(),
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .expect("time should be after epoch")
                    .as_nanos()
            ));
            std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
            BridgeConfig::default().with_base_path(format!("{}/", dir.display()))
        }

        fn engine(tag: &str) -> (TransmitEngine, PacketQueue) {
            let config = test_config(tag);
            let endpoint = config.endpoint("scope", Direction::Tx);
            let queue = PacketQueue::new();
            (TransmitEngine::new(endpoint, queue.clone(), config), queue)
        }

        fn cleanup(engine: &TransmitEngine) {
            let _ = std::fs::remove_dir_all(engine.endpoint().base());
        }

        #[test]
        fn peer_observes_reference_bytes() {
            let (mut engine, queue) = engine("e2e");
            queue.enqueue(Packet::new(1, 0x0808, vec![1u8, 2, 3, 4, 5]));
            engine.start().unwrap();

            let mut peer = connect(engine.endpoint()).unwrap();
            let mut header = [0u8; 6];
            peer.read_exact(&mut header).unwrap();
            assert_eq!(header, [0x01, 0x00, 0x08, 0x08, 0x05, 0x00]);
            let mut payload = [0u8; 5];
            peer.read_exact(&mut payload).unwrap();
            assert_eq!(payload, [1, 2, 3, 4, 5]);

            engine.stop().unwrap();
            cleanup(&engine);
        }

        #[test]
        fn packets_leave_in_fifo_order() {
            let (mut engine, queue) = engine("fifo");
            engine.start().unwrap();
            let mut peer = connect(engine.endpoint()).unwrap();

            for id in [1u16, 2, 3] {
                queue.enqueue(Packet::new(7, id, Vec::<u8>::new()));
            }
            let mut ids = Vec::new();
            for _ in 0..3 {
                let mut header = [0u8; 6];
                peer.read_exact(&mut header).unwrap();
                ids.push(u16::from_le_bytes([header[2], header[3]]));
            }
            assert_eq!(ids, vec![1, 2, 3]);

            engine.stop().unwrap();
            cleanup(&engine);
        }

        #[test]
        fn stop_is_idempotent() {
            let (mut engine, _queue) = engine("idem");
            assert!(engine.stop().is_ok());
            assert!(engine.stop().is_ok());

            engine.start().unwrap();
            assert!(engine.stop().is_ok());
            assert!(engine.stop().is_ok());
            assert!(!engine.is_active());
            assert_eq!(engine.state(), EngineState::Stopped);
            cleanup(&engine);
        }

        #[test]
        fn stop_while_listening_releases_endpoint() {
            let (mut engine, _queue) = engine("listening");
            engine.start().unwrap();
            assert_eq!(engine.state(), EngineState::Listening);
            let address = engine.endpoint().address();
            assert!(std::path::Path::new(&address).exists());

            let started = Instant::now();
            engine.stop().unwrap();
            assert!(started.elapsed() < Duration::from_secs(2));
            assert_eq!(engine.last_exit(), Some(WorkerExit::Stopped));
            assert!(!std::path::Path::new(&address).exists());
            cleanup(&engine);
        }

        #[test]
        fn start_while_running_restarts() {
            let (mut engine, queue) = engine("restart");
            engine.start().unwrap();
            let _first_peer = connect(engine.endpoint()).unwrap();
            wait_for(|| engine.state() == EngineState::Running);

            engine.start().unwrap();
            assert_eq!(engine.last_exit(), Some(WorkerExit::Stopped));
            assert_eq!(engine.state(), EngineState::Listening);

            // The address was released and rebound; a new peer gets traffic.
            let mut peer = connect(engine.endpoint()).unwrap();
            queue.enqueue(Packet::new(2, 9, vec![0xAAu8]));
            let mut frame = [0u8; 7];
            peer.read_exact(&mut frame).unwrap();
            assert_eq!(frame, [0x02, 0x00, 0x09, 0x00, 0x01, 0x00, 0xAA]);

            engine.stop().unwrap();
            cleanup(&engine);
        }

        #[test]
        fn peer_hangup_ends_worker_as_disconnected() {
            let (mut engine, queue) = engine("hangup");
            engine.start().unwrap();
            let peer = connect(engine.endpoint()).unwrap();
            wait_for(|| engine.state() == EngineState::Running);
            drop(peer);

            wait_for(|| {
                queue.enqueue(Packet::new(0, 1, vec![0u8; 64]));
                !engine.is_active()
            });
            engine.stop().unwrap();
            assert_eq!(engine.last_exit(), Some(WorkerExit::Disconnected));
            cleanup(&engine);
        }
    }
}
