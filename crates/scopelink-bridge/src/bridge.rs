use scopelink_transport::{ChannelTransport, Direction, Endpoint, NativeChannel};
use tracing::warn;

use crate::config::BridgeConfig;
use crate::engine::{EngineState, WorkerExit};
use crate::error::Result;
use crate::handler::{LogHandler, PacketHandler};
use crate::queue::PacketQueue;
use crate::receive::ReceiveEngine;
use crate::transmit::TransmitEngine;

/// Both directions of one logical channel.
///
/// `name` yields two endpoints, `<base><name>TX` for outbound traffic and
/// `<base><name>RX` for inbound. Each direction starts and stops on its own;
/// dropping the bridge stops both.
pub struct Bridge<T: ChannelTransport = NativeChannel> {
    name: String,
    transmit: TransmitEngine<T>,
    receive: ReceiveEngine<T>,
}

impl Bridge<NativeChannel> {
    /// Bridge with the default configuration. Received packets are logged
    /// and discarded by [`LogHandler`].
    pub fn new(name: impl Into<String>, outbound: PacketQueue) -> Self {
        Self::with_config(name, outbound, LogHandler, BridgeConfig::default())
    }

    pub fn with_config(
        name: impl Into<String>,
        outbound: PacketQueue,
        handler: impl PacketHandler,
        config: BridgeConfig,
    ) -> Self {
        Self::with_transport(name, outbound, handler, config)
    }
}

impl<T: ChannelTransport> Bridge<T> {
    /// Bridge over an explicit transport implementation.
    pub fn with_transport(
        name: impl Into<String>,
        outbound: PacketQueue,
        handler: impl PacketHandler,
        config: BridgeConfig,
    ) -> Self {
        let name = name.into();
        let tx = config.endpoint(&name, Direction::Tx);
        let rx = tx.counterpart();
        Self {
            transmit: TransmitEngine::with_transport(tx, outbound, config.clone()),
            receive: ReceiveEngine::with_transport(rx, handler, config),
            name,
        }
    }

    pub fn start_send(&mut self) -> Result<()> {
        self.transmit.start()
    }

    pub fn stop_send(&mut self) -> Result<()> {
        self.transmit.stop()
    }

    pub fn start_receive(&mut self) -> Result<()> {
        self.receive.start()
    }

    pub fn stop_receive(&mut self) -> Result<()> {
        self.receive.stop()
    }

    /// Stop both directions. Both are attempted; the first error wins.
    pub fn stop(&mut self) -> Result<()> {
        let send = self.transmit.stop();
        let receive = self.receive.stop();
        send.and(receive)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn send_state(&self) -> EngineState {
        self.transmit.state()
    }

    pub fn receive_state(&self) -> EngineState {
        self.receive.state()
    }

    pub fn send_exit(&self) -> Option<WorkerExit> {
        self.transmit.last_exit()
    }

    pub fn receive_exit(&self) -> Option<WorkerExit> {
        self.receive.last_exit()
    }

    pub fn tx_endpoint(&self) -> &Endpoint {
        self.transmit.endpoint()
    }

    pub fn rx_endpoint(&self) -> &Endpoint {
        self.receive.endpoint()
    }

    /// The queue the transmit side drains. Clone it to produce packets.
    pub fn outbound_queue(&self) -> &PacketQueue {
        self.transmit.queue()
    }

    pub fn transmit(&self) -> &TransmitEngine<T> {
        &self.transmit
    }

    pub fn receive(&self) -> &ReceiveEngine<T> {
        &self.receive
    }
}

impl<T: ChannelTransport> Drop for Bridge<T> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(name = %self.name, error = %err, "bridge teardown reported an error");
        }
    }
}

impl<T: ChannelTransport> std::fmt::Debug for Bridge<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("name", &self.name)
            .field("send", &self.transmit.state())
            .field("receive", &self.receive.state())
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{Read, Write};
    use std::path::Path;
    use std::time::{Duration, Instant};

    use scopelink_frame::Packet;
    use scopelink_transport::connect;

    use super::*;

    fn test_config(tag: &str) -> BridgeConfig {
        let dir = std::path::PathBuf::from(format!(
            "/tmp/scl-br-{}-{}-{}",
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

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn endpoints_follow_naming() {
        let config = BridgeConfig::default().with_base_path("/tmp/");
        let bridge = Bridge::with_config("testPipe", PacketQueue::new(), PacketQueue::new(), config);
        assert_eq!(bridge.tx_endpoint().address(), "/tmp/testPipeTX");
        assert_eq!(bridge.rx_endpoint().address(), "/tmp/testPipeRX");
        assert_eq!(bridge.send_state(), EngineState::Stopped);
        assert_eq!(bridge.receive_state(), EngineState::Stopped);
    }

    #[test]
    fn default_bridge_logs_and_discards_inbound() {
        let name = format!(
            "scl-br-default-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        );
        let mut bridge = Bridge::new(name.as_str(), PacketQueue::new());
        assert_eq!(bridge.rx_endpoint().base(), scopelink_transport::DEFAULT_BASE_PATH);
        bridge.start_receive().unwrap();

        let mut peer = connect(bridge.rx_endpoint()).unwrap();
        peer.write_all(&[1, 0, 0x08, 0x08, 0x02, 0x00, 0xAA, 0xBB]).unwrap();
        peer.write_all(&[2, 0, 0x09, 0x08, 0x00, 0x00]).unwrap();
        drop(peer);

        wait_for(|| bridge.receive_state() == EngineState::Stopped);
        bridge.stop_receive().unwrap();
        assert_eq!(bridge.receive_exit(), Some(WorkerExit::Disconnected));
        assert!(!Path::new(&bridge.rx_endpoint().address()).exists());
    }

    #[test]
    fn both_directions_carry_traffic() {
        let config = test_config("duplex");
        let base = config.base_path.clone();
        let outbound = PacketQueue::new();
        let inbound = PacketQueue::new();
        let mut bridge = Bridge::with_config("scope", outbound.clone(), inbound.clone(), config);

        bridge.start_send().unwrap();
        bridge.start_receive().unwrap();

        outbound.enqueue(Packet::new(1, 0x0808, vec![1u8, 2, 3, 4, 5]));
        let mut tx_peer = connect(bridge.tx_endpoint()).unwrap();
        let mut frame = [0u8; 11];
        tx_peer.read_exact(&mut frame).unwrap();
        assert_eq!(frame, [0x01, 0x00, 0x08, 0x08, 0x05, 0x00, 1, 2, 3, 4, 5]);

        let mut rx_peer = connect(bridge.rx_endpoint()).unwrap();
        rx_peer.write_all(&[0x04, 0x00, 0x10, 0x00, 0x02, 0x00, 0xAB, 0xCD]).unwrap();
        let received = inbound.dequeue_timeout(Duration::from_secs(5));
        assert_eq!(received, Some(Packet::new(4, 0x10, vec![0xABu8, 0xCD])));

        bridge.stop().unwrap();
        assert_eq!(bridge.send_state(), EngineState::Stopped);
        assert_eq!(bridge.receive_state(), EngineState::Stopped);
        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn directions_are_independent() {
        let config = test_config("independent");
        let base = config.base_path.clone();
        let mut bridge = Bridge::with_config("scope", PacketQueue::new(), PacketQueue::new(), config);

        bridge.start_receive().unwrap();
        assert_eq!(bridge.send_state(), EngineState::Stopped);
        assert_eq!(bridge.receive_state(), EngineState::Listening);

        // Out-of-order and repeated stops are harmless.
        bridge.stop_send().unwrap();
        bridge.stop_send().unwrap();
        assert_eq!(bridge.receive_state(), EngineState::Listening);

        bridge.stop_receive().unwrap();
        bridge.stop_receive().unwrap();
        assert!(!Path::new(&bridge.rx_endpoint().address()).exists());
        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn drop_releases_both_endpoints() {
        let config = test_config("drop");
        let base = config.base_path.clone();
        let mut bridge = Bridge::with_config("scope", PacketQueue::new(), PacketQueue::new(), config);
        bridge.start_send().unwrap();
        bridge.start_receive().unwrap();
        let tx = bridge.tx_endpoint().address();
        let rx = bridge.rx_endpoint().address();

        let _rx_peer = connect(bridge.rx_endpoint()).unwrap();
        wait_for(|| bridge.receive_state() == EngineState::Running);

        drop(bridge);
        assert!(!Path::new(&tx).exists());
        assert!(!Path::new(&rx).exists());
        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn restart_after_disconnect() {
        let config = test_config("reconnect");
        let base = config.base_path.clone();
        let inbound = PacketQueue::new();
        let mut bridge = Bridge::with_config("scope", PacketQueue::new(), inbound.clone(), config);
        bridge.start_receive().unwrap();

        let peer = connect(bridge.rx_endpoint()).unwrap();
        wait_for(|| bridge.receive_state() == EngineState::Running);
        drop(peer);
        wait_for(|| bridge.receive_state() == EngineState::Stopped);

        // No automatic reconnection: the owner cycles the direction.
        bridge.stop_receive().unwrap();
        assert_eq!(bridge.receive_exit(), Some(WorkerExit::Disconnected));
        bridge.start_receive().unwrap();

        let mut peer = connect(bridge.rx_endpoint()).unwrap();
        peer.write_all(&[1, 0, 2, 0, 0, 0]).unwrap();
        assert_eq!(
            inbound.dequeue_timeout(Duration::from_secs(5)),
            Some(Packet::new(1, 2, Vec::<u8>::new()))
        );
        bridge.stop().unwrap();
        let _ = std::fs::remove_dir_all(base);
    }
}
