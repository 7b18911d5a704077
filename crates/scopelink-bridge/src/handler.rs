//! Receive-side processing hooks.
//!
//! The receive engine hands every reconstructed packet to a
//! [`PacketHandler`]. The handler runs under its own lock, separate from the
//! outbound queue's lock.

use std::sync::{Arc, Mutex};

use scopelink_frame::Packet;
use tracing::info;

use crate::queue::PacketQueue;

/// Consumes packets read from the inbound channel.
pub trait PacketHandler: Send + 'static {
    /// Take ownership of one received packet.
    fn handle(&mut self, packet: Packet);
}

impl<F> PacketHandler for F
where
    F: FnMut(Packet) + Send + 'static,
{
    fn handle(&mut self, packet: Packet) {
        self(packet)
    }
}

/// Collect received packets for the application to drain.
impl PacketHandler for PacketQueue {
    fn handle(&mut self, packet: Packet) {
        self.enqueue(packet);
    }
}

/// Default handler: log the packet and drop it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

impl PacketHandler for LogHandler {
    fn handle(&mut self, packet: Packet) {
        info!(
            command = packet.command,
            packet_id = packet.packet_id,
            data_size = packet.payload.len(),
            ?packet,
            "received packet"
        );
    }
}

pub(crate) type SharedHandler = Arc<Mutex<Box<dyn PacketHandler>>>;

pub(crate) fn shared(handler: impl PacketHandler) -> SharedHandler {
    Arc::new(Mutex::new(Box::new(handler)))
}
