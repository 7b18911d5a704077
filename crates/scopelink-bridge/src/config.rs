use std::time::Duration;

use scopelink_frame::{max_payload_for, DEFAULT_BUFFER_CAPACITY, HEADER_SIZE};
use scopelink_transport::{ChannelOptions, Direction, Endpoint, DEFAULT_BASE_PATH};

use crate::error::{BridgeError, Result};

/// Default wait between queue checks on the transmit side.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(500);

/// What the transmit worker does when writing one packet fails.
///
/// A vanished peer always ends the worker; this only covers other I/O errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteFailurePolicy {
    /// Log, drop the packet, keep draining the queue.
    #[default]
    Continue,
    /// Log and end the worker; the owner must stop/start to reconnect.
    Disconnect,
}

/// What the receive worker does with a header whose `dataSize` exceeds the
/// maximum payload.
///
/// Neither policy reads the claimed payload. Multi-frame reassembly of large
/// payloads is not implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversizePolicy {
    /// Hand the handler a packet with a single zero byte in place of the
    /// payload and keep reading.
    #[default]
    Placeholder,
    /// Treat the header as a protocol violation and end the worker.
    Disconnect,
}

/// Configuration shared by both directions of a bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Prefix for endpoint addresses. Concatenated verbatim with the name.
    pub base_path: String,
    /// Transport buffer size, header included. Default: 4096.
    pub buffer_capacity: usize,
    /// Longest the transmit worker waits on an empty queue before it
    /// re-checks its run flag. Default: 500µs.
    pub poll_interval: Duration,
    /// Read timeout on the inbound channel. `None` blocks until data or
    /// disconnect.
    pub read_timeout: Option<Duration>,
    /// Write timeout on the outbound channel.
    pub write_timeout: Option<Duration>,
    /// Permission bits for socket files.
    pub socket_mode: u32,
    pub write_failure: WriteFailurePolicy,
    pub oversize: OversizePolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_timeout: None,
            write_timeout: None,
            socket_mode: ChannelOptions::default().socket_mode,
            write_failure: WriteFailurePolicy::default(),
            oversize: OversizePolicy::default(),
        }
    }
}

impl BridgeConfig {
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_write_timeout(mut self, write_timeout: Option<Duration>) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn with_write_failure(mut self, policy: WriteFailurePolicy) -> Self {
        self.write_failure = policy;
        self
    }

    pub fn with_oversize(mut self, policy: OversizePolicy) -> Self {
        self.oversize = policy;
        self
    }

    /// Largest payload either direction will send or accept.
    pub fn max_payload(&self) -> usize {
        max_payload_for(self.buffer_capacity)
    }

    /// Address for one direction of the logical channel `name`.
    pub fn endpoint(&self, name: &str, direction: Direction) -> Endpoint {
        Endpoint::with_base(self.base_path.clone(), name, direction)
    }

    pub(crate) fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            socket_mode: self.socket_mode,
        }
    }

    /// Reject settings the engines cannot run with.
    pub fn validate(&self) -> Result<()> {
        let max_capacity = HEADER_SIZE + u16::MAX as usize;
        if self.buffer_capacity <= HEADER_SIZE || self.buffer_capacity > max_capacity {
            return Err(BridgeError::InvalidConfig(format!(
                "buffer_capacity must be in {}..={max_capacity}, got {}",
                HEADER_SIZE + 1,
                self.buffer_capacity
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(BridgeError::InvalidConfig(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if matches!(self.read_timeout, Some(t) if t.is_zero())
            || matches!(self.write_timeout, Some(t) if t.is_zero())
        {
            return Err(BridgeError::InvalidConfig(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
