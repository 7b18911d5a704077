use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::channel::{ChannelOptions, ChannelState, ChannelTransport, PeerInfo, ShutdownHandle};
use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

/// Unix domain socket channel.
///
/// Binds a filesystem-path socket, accepts a single peer and then stops
/// listening, so later connection attempts are refused. The socket file is
/// removed on close, but only if it is still the one this channel created.
pub struct UnixChannel {
    endpoint: Endpoint,
    path: PathBuf,
    listener: Option<UnixListener>,
    peer: Option<IpcStream>,
    options: ChannelOptions,
    created_inode: Option<(u64, u64)>,
    shutdown: ShutdownHandle,
    state: ChannelState,
}

impl UnixChannel {
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(target_os = "macos")]
    const MAX_PATH_LEN: usize = 104;
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    const MAX_PATH_LEN: usize = 104;

    /// Connect to a listening channel as the peer (blocking).
    pub fn connect(endpoint: &Endpoint) -> Result<IpcStream> {
        let address = endpoint.address();
        let stream = UnixStream::connect(&address).map_err(|e| TransportError::Connect {
            address: address.clone(),
            source: e,
        })?;
        debug!(%address, "connected to unix domain socket");
        Ok(IpcStream::from_unix(stream))
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn remove_stale(path: &Path, address: &str) -> Result<()> {
        let metadata = match std::fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(TransportError::CreationFailed {
                    address: address.to_string(),
                    source: e,
                })
            }
        };
        if !metadata.file_type().is_socket() {
            // Never remove something that is not ours to remove.
            return Err(TransportError::AddressInUse {
                address: address.to_string(),
            });
        }
        debug!(%address, "removing stale socket");
        std::fs::remove_file(path).map_err(|e| TransportError::CreationFailed {
            address: address.to_string(),
            source: e,
        })
    }

    fn remove_created_path(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode.take() else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(
                    path = ?self.path,
                    "socket path identity changed; skipping cleanup"
                );
            }
        }
    }
}

impl ChannelTransport for UnixChannel {
    fn bind(endpoint: &Endpoint, options: &ChannelOptions) -> Result<Self> {
        let address = endpoint.address();
        let path = PathBuf::from(&address);

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                address,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        // Unlink before bind: a previous unclean shutdown may have left the file.
        Self::remove_stale(&path, &address)?;

        let listener = UnixListener::bind(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                TransportError::AddressInUse {
                    address: address.clone(),
                }
            } else {
                TransportError::CreationFailed {
                    address: address.clone(),
                    source: e,
                }
            }
        })?;

        let creation_failed = |e| TransportError::CreationFailed {
            address: address.clone(),
            source: e,
        };
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(options.socket_mode))
            .map_err(creation_failed)?;
        let created_metadata = std::fs::symlink_metadata(&path).map_err(creation_failed)?;

        info!(%address, "listening on unix domain socket");

        Ok(Self {
            endpoint: endpoint.clone(),
            shutdown: ShutdownHandle::new(address),
            path,
            listener: Some(listener),
            peer: None,
            options: options.clone(),
            created_inode: Some((created_metadata.dev(), created_metadata.ino())),
            state: ChannelState::Listening,
        })
    }

    fn accept_one(&mut self) -> Result<PeerInfo> {
        if self.shutdown.is_requested() {
            return Err(TransportError::Shutdown);
        }
        let listener = match (&self.listener, self.state) {
            (Some(listener), ChannelState::Listening) => listener,
            (_, ChannelState::Connected) => {
                return Err(TransportError::AcceptFailed(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "channel already has its peer",
                )))
            }
            _ => return Err(TransportError::Shutdown),
        };

        let (stream, _addr) = listener.accept().map_err(TransportError::AcceptFailed)?;
        let stream = IpcStream::from_unix(stream);

        if self.shutdown.is_requested() || !self.shutdown.arm(stream.try_clone()?) {
            return Err(TransportError::Shutdown);
        }

        stream.set_read_timeout(self.options.read_timeout)?;
        stream.set_write_timeout(self.options.write_timeout)?;

        let info = PeerInfo {
            credentials: stream.peer_credentials(),
        };
        match info.credentials {
            Some((uid, _, pid)) => info!(address = %self.endpoint, uid, pid, "peer connected"),
            None => info!(address = %self.endpoint, "peer connected"),
        }

        // Single peer per run: stop listening so further connects are refused.
        self.listener = None;
        self.peer = Some(stream);
        self.state = ChannelState::Connected;
        Ok(info)
    }

    fn peer_mut(&mut self) -> Result<&mut IpcStream> {
        self.peer.as_mut().ok_or(TransportError::NotConnected)
    }

    fn close(&mut self) {
        if self.state == ChannelState::Closed {
            return;
        }
        self.shutdown.disarm();
        if let Some(peer) = self.peer.take() {
            peer.shutdown();
        }
        self.listener = None;
        self.remove_created_path();
        self.state = ChannelState::Closed;
        debug!(address = %self.endpoint, "channel closed");
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
        "unix-domain-socket"
    }
}

impl Drop for UnixChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connect-and-drop so that a thread blocked in `accept` returns.
pub(crate) fn wake_listener(address: &str) {
    if let Err(err) = UnixStream::connect(address) {
        if err.kind() != std::io::ErrorKind::NotFound
            && err.kind() != std::io::ErrorKind::ConnectionRefused
        {
            warn!(%address, error = %err, "failed to wake listener");
        }
    }
}
