//! Scripted in-memory channel for engine tests.
//!
//! `bind` looks its script up by endpoint address, so each test registers a
//! script under a unique name and inspects it after the engine ran.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};

use scopelink_transport::{
    ChannelOptions, ChannelState, ChannelTransport, Endpoint, IpcStream, PeerInfo, Result,
    ShutdownHandle, TransportError,
};

#[derive(Default)]
pub(crate) struct Script {
    /// Bytes the "peer" has sent. Running dry reads as a hang-up.
    pub input: VecDeque<u8>,
    /// Reads that report a timeout before any input is served.
    pub transient_reads: usize,
    /// Zero-based write indices that fail with a non-disconnect I/O error.
    pub failing_writes: Vec<usize>,
    /// Successful writes, in order.
    pub written: Vec<Vec<u8>>,
    /// Length of every buffer passed to `read_exact`.
    pub read_sizes: Vec<usize>,
    pub writes_seen: usize,
}

pub(crate) type SharedScript = Arc<Mutex<Script>>;

fn registry() -> &'static Mutex<HashMap<String, SharedScript>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, SharedScript>>> = OnceLock::new();
    REGISTRY.get_or_init(Default::default)
}

/// Register `script` for the endpoint at `address`.
pub(crate) fn install(address: String, script: Script) -> SharedScript {
    let shared = Arc::new(Mutex::new(script));
    registry()
        .lock()
        .unwrap()
        .insert(address, Arc::clone(&shared));
    shared
}

/// Base path that never exists on disk, so waking a mock "listener" is a no-op.
pub(crate) const MOCK_BASE: &str = "/nonexistent/scopelink-mock/";

pub(crate) struct MockChannel {
    endpoint: Endpoint,
    script: SharedScript,
    shutdown: ShutdownHandle,
    state: ChannelState,
}

impl ChannelTransport for MockChannel {
    fn bind(endpoint: &Endpoint, _options: &ChannelOptions) -> Result<Self> {
        let address = endpoint.address();
        let script = registry()
            .lock()
            .unwrap()
            .get(&address)
            .cloned()
            .ok_or(TransportError::AddressInUse {
                address: address.clone(),
            })?;
        Ok(Self {
            endpoint: endpoint.clone(),
            script,
            shutdown: ShutdownHandle::new(address),
            state: ChannelState::Listening,
        })
    }

    fn accept_one(&mut self) -> Result<PeerInfo> {
        self.state = ChannelState::Connected;
        Ok(PeerInfo::default())
    }

    fn peer_mut(&mut self) -> Result<&mut IpcStream> {
        Err(TransportError::NotConnected)
    }

    fn close(&mut self) {
        self.state = ChannelState::Closed;
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    fn transport_name(&self) -> &'static str {
        "mock"
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut script = self.script.lock().unwrap();
        script.read_sizes.push(buf.len());
        if script.transient_reads > 0 {
            script.transient_reads -= 1;
            return Err(TransportError::TransientRetry);
        }
        let n = buf.len().min(script.input.len());
        for (slot, byte) in buf.iter_mut().zip(script.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        let index = script.writes_seen;
        script.writes_seen += 1;
        if script.failing_writes.contains(&index) {
            return Err(TransportError::Io(std::io::Error::other("scripted failure")));
        }
        script.written.push(bytes.to_vec());
        Ok(())
    }
}
