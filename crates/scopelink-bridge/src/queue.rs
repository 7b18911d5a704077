use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use scopelink_frame::Packet;

/// Thread-safe FIFO of packets awaiting transmission.
///
/// Cloning yields another handle to the same queue: the application keeps
/// one to produce, the transmit engine keeps one to consume. The lock is held
/// only while the deque is mutated, never across I/O. Depth is unbounded.
#[derive(Clone, Default)]
pub struct PacketQueue {
    inner: Arc<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    packets: Mutex<VecDeque<Packet>>,
    ready: Condvar,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a packet; ownership moves into the queue.
    pub fn enqueue(&self, packet: Packet) {
        self.lock().push_back(packet);
        self.inner.ready.notify_one();
    }

    /// Remove the front packet, or `None` if the queue is empty.
    pub fn try_dequeue(&self) -> Option<Packet> {
        self.lock().pop_front()
    }

    /// Remove the front packet, waiting up to `timeout` for one to arrive.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<Packet> {
        let guard = self.lock();
        let (mut guard, _) = self
            .inner
            .ready
            .wait_timeout_while(guard, timeout, |packets| packets.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        guard.pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every pending packet, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut packets = self.lock();
        let dropped = packets.len();
        packets.clear();
        dropped
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Packet>> {
        self.inner
            .packets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PacketQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketQueue")
            .field("len", &self.len())
            .finish()
    }
}
