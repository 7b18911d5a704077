use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{is_disconnect_kind, Result, TransportError};
use crate::stream::IpcStream;

/// Lifecycle of a single-peer channel.
///
/// `Unbound -> Listening -> Connected -> Closed`. A channel never goes back
/// to `Listening`; reconnecting means closing and binding a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unbound,
    Listening,
    Connected,
    Closed,
}

/// Per-channel tuning applied at bind/accept time.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Read timeout on the accepted stream. `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
    /// Write timeout on the accepted stream. `None` blocks indefinitely.
    pub write_timeout: Option<Duration>,
    /// Permission bits for filesystem-backed endpoints.
    pub socket_mode: u32,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            read_timeout: None,
            write_timeout: None,
            socket_mode: 0o600,
        }
    }
}

/// What is known about the accepted peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeerInfo {
    /// `(uid, gid, pid)` where the platform exposes it.
    pub credentials: Option<(u32, u32, u32)>,
}

/// One-shot server side of a local channel.
///
/// Implementations create the endpoint in [`bind`](Self::bind), accept
/// exactly one peer, and move raw bytes to and from it. The byte-level
/// helpers are provided on top of [`peer_mut`](Self::peer_mut).
pub trait ChannelTransport: Send + Sized + 'static {
    /// Create the endpoint, removing any stale artifact left at its address.
    fn bind(endpoint: &Endpoint, options: &ChannelOptions) -> Result<Self>;

    /// Block until exactly one peer connects.
    fn accept_one(&mut self) -> Result<PeerInfo>;

    /// The connected peer stream.
    fn peer_mut(&mut self) -> Result<&mut IpcStream>;

    /// Release the endpoint and any address artifact. Idempotent.
    fn close(&mut self);

    fn endpoint(&self) -> &Endpoint;

    fn state(&self) -> ChannelState;

    /// A handle another thread can use to unblock this channel.
    fn shutdown_handle(&self) -> ShutdownHandle;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;

    /// Fill `buf` from the peer.
    ///
    /// Returns `buf.len()` on success. A shorter count means the peer hung up
    /// after that many bytes. `TransientRetry` is returned only when a read
    /// timeout elapsed before any byte arrived.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.peer_mut()?;
        let mut filled = 0usize;
        while filled < buf.len() {
            match stream.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_transient(&err) => {
                    if filled == 0 {
                        return Err(TransportError::TransientRetry);
                    }
                }
                Err(err) if is_disconnect_kind(err.kind()) => break,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(filled)
    }

    /// Write every byte of `bytes` to the peer.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.peer_mut()?;
        let mut offset = 0usize;
        while offset < bytes.len() {
            match stream.write(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::Disconnected),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_disconnect_kind(err.kind()) => {
                    return Err(TransportError::Disconnected)
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        stream.flush().map_err(|err| {
            if is_disconnect_kind(err.kind()) {
                TransportError::Disconnected
            } else {
                TransportError::Io(err)
            }
        })
    }
}

/// Timeouts, plus a message-mode pipe reporting that more bytes are pending.
fn is_transient(err: &std::io::Error) -> bool {
    #[cfg(windows)]
    if err.raw_os_error() == Some(windows_sys::Win32::Foundation::ERROR_MORE_DATA as i32) {
        return true;
    }
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// Cross-thread cancellation for a channel.
///
/// [`request`](Self::request) wakes a thread parked in `accept_one` by
/// connecting to the endpoint, or a thread parked in a read/write by
/// shutting the peer stream down.
#[derive(Clone)]
pub struct ShutdownHandle {
    inner: Arc<ShutdownState>,
}

struct ShutdownState {
    requested: AtomicBool,
    address: String,
    peer: Mutex<Option<IpcStream>>,
}

impl ShutdownHandle {
    /// Create a handle for the endpoint at `address`.
    ///
    /// Custom [`ChannelTransport`] implementations create one at bind time and
    /// [`arm`](Self::arm) it once their peer is accepted.
    pub fn new(address: String) -> Self {
        Self {
            inner: Arc::new(ShutdownState {
                requested: AtomicBool::new(false),
                address,
                peer: Mutex::new(None),
            }),
        }
    }

    /// Request shutdown and unblock whatever the channel is waiting on.
    pub fn request(&self) {
        if self.inner.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        let peer = self
            .inner
            .peer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match peer {
            Some(stream) => {
                debug!(address = %self.inner.address, "shutting down peer stream");
                stream.shutdown();
            }
            None => {
                debug!(address = %self.inner.address, "waking listener");
                wake_listener(&self.inner.address);
            }
        }
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Register the accepted peer. Returns `false` if shutdown already won.
    pub fn arm(&self, stream: IpcStream) -> bool {
        let mut slot = self
            .inner
            .peer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_requested() {
            return false;
        }
        *slot = Some(stream);
        true
    }

    /// Forget the registered peer stream.
    pub fn disarm(&self) {
        self.inner
            .peer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("address", &self.inner.address)
            .field("requested", &self.is_requested())
            .finish()
    }
}

#[cfg(unix)]
fn wake_listener(address: &str) {
    crate::uds::wake_listener(address);
}

#[cfg(windows)]
fn wake_listener(address: &str) {
    crate::pipe::wake_listener(address);
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write as _;
    use std::path::PathBuf;
    use std::thread;

    use super::*;
    use crate::endpoint::Direction;
    use crate::uds::UnixChannel;

    fn test_base(tag: &str) -> String {
        let dir = PathBuf::from(format!(
            "/tmp/scl-ch-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        format!("{}/", dir.display())
    }

    #[test]
    fn read_exact_assembles_partial_writes() {
        let endpoint = Endpoint::with_base(test_base("partial"), "p", Direction::Rx);
        let mut channel = UnixChannel::bind(&endpoint, &ChannelOptions::default()).unwrap();

        let ep = endpoint.clone();
        let peer = thread::spawn(move || {
            let mut stream = crate::connect(&ep).unwrap();
            for chunk in [&b"he"[..], b"ll", b"o!"] {
                stream.write_all(chunk).unwrap();
                thread::sleep(Duration::from_millis(5));
            }
        });

        channel.accept_one().unwrap();
        let mut buf = [0u8; 6];
        assert_eq!(channel.read_exact(&mut buf).unwrap(), 6);
        assert_eq!(&buf, b"hello!");
        peer.join().unwrap();

        // Peer is gone: a short count signals the disconnect.
        assert_eq!(channel.read_exact(&mut buf).unwrap(), 0);
        let _ = std::fs::remove_dir_all(endpoint.base());
    }

    #[test]
    fn read_timeout_is_transient() {
        let endpoint = Endpoint::with_base(test_base("transient"), "t", Direction::Rx);
        let options = ChannelOptions {
            read_timeout: Some(Duration::from_millis(10)),
            ..ChannelOptions::default()
        };
        let mut channel = UnixChannel::bind(&endpoint, &options).unwrap();

        let ep = endpoint.clone();
        let peer = thread::spawn(move || crate::connect(&ep).unwrap());
        channel.accept_one().unwrap();
        let _stream = peer.join().unwrap();

        let mut buf = [0u8; 6];
        let err = channel.read_exact(&mut buf).unwrap_err();
        assert!(matches!(err, TransportError::TransientRetry));
        let _ = std::fs::remove_dir_all(endpoint.base());
    }

    #[test]
    fn io_before_accept_is_not_connected() {
        let endpoint = Endpoint::with_base(test_base("noconn"), "n", Direction::Tx);
        let mut channel = UnixChannel::bind(&endpoint, &ChannelOptions::default()).unwrap();
        assert!(matches!(
            channel.write_all(b"x"),
            Err(TransportError::NotConnected)
        ));
        let _ = std::fs::remove_dir_all(endpoint.base());
    }

    #[test]
    fn request_unblocks_accept() {
        let endpoint = Endpoint::with_base(test_base("wake"), "w", Direction::Tx);
        let mut channel = UnixChannel::bind(&endpoint, &ChannelOptions::default()).unwrap();
        let handle = channel.shutdown_handle();

        let waiter = thread::spawn(move || channel.accept_one());
        thread::sleep(Duration::from_millis(20));
        handle.request();

        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(TransportError::Shutdown)));
        assert!(handle.is_requested());
        let _ = std::fs::remove_dir_all(endpoint.base());
    }

    #[test]
    fn request_unblocks_connected_reader() {
        let endpoint = Endpoint::with_base(test_base("wake-read"), "r", Direction::Rx);
        let mut channel = UnixChannel::bind(&endpoint, &ChannelOptions::default()).unwrap();
        let handle = channel.shutdown_handle();

        let ep = endpoint.clone();
        let peer = thread::spawn(move || crate::connect(&ep).unwrap());
        channel.accept_one().unwrap();
        let _stream = peer.join().unwrap();

        let reader = thread::spawn(move || {
            let mut buf = [0u8; 6];
            channel.read_exact(&mut buf)
        });
        thread::sleep(Duration::from_millis(20));
        handle.request();
        // Second request is a no-op.
        handle.request();

        assert_eq!(reader.join().unwrap().unwrap(), 0);
        let _ = std::fs::remove_dir_all(endpoint.base());
    }
}
