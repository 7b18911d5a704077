use std::fs::{File, OpenOptions};
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle};

use tracing::{debug, info};
use windows_sys::Win32::Foundation::{
    ERROR_ACCESS_DENIED, ERROR_PIPE_BUSY, ERROR_PIPE_CONNECTED, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{FILE_FLAG_FIRST_PIPE_INSTANCE, PIPE_ACCESS_DUPLEX};
use windows_sys::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, PIPE_READMODE_BYTE, PIPE_REJECT_REMOTE_CLIENTS,
    PIPE_TYPE_BYTE, PIPE_WAIT,
};

use crate::channel::{ChannelOptions, ChannelState, ChannelTransport, PeerInfo, ShutdownHandle};
use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

/// In/out buffer size requested for the pipe instance.
const PIPE_BUFFER_SIZE: u32 = 4096 * 16;

/// Windows named pipe channel.
///
/// Creates a single, local-only pipe instance. `FILE_FLAG_FIRST_PIPE_INSTANCE`
/// makes creation fail if another process already owns the name. Pipes leave
/// no filesystem artifact, so there is nothing stale to remove before binding.
pub struct PipeChannel {
    endpoint: Endpoint,
    pipe: Option<File>,
    peer: Option<IpcStream>,
    shutdown: ShutdownHandle,
    state: ChannelState,
}

impl PipeChannel {
    /// Connect to a listening pipe as the peer (blocking).
    pub fn connect(endpoint: &Endpoint) -> Result<IpcStream> {
        let address = endpoint.address();
        let pipe = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&address)
            .map_err(|e| TransportError::Connect {
                address: address.clone(),
                source: e,
            })?;
        debug!(%address, "connected to named pipe");
        Ok(IpcStream::from_pipe(pipe))
    }
}

impl ChannelTransport for PipeChannel {
    fn bind(endpoint: &Endpoint, _options: &ChannelOptions) -> Result<Self> {
        let address = endpoint.address();
        let wide: Vec<u16> = std::ffi::OsStr::new(&address)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: `wide` is a NUL-terminated UTF-16 string that outlives the call,
        // and a null security-attributes pointer selects the default descriptor.
        let handle = unsafe {
            CreateNamedPipeW(
                wide.as_ptr(),
                PIPE_ACCESS_DUPLEX | FILE_FLAG_FIRST_PIPE_INSTANCE,
                PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT | PIPE_REJECT_REMOTE_CLIENTS,
                1,
                PIPE_BUFFER_SIZE,
                PIPE_BUFFER_SIZE,
                0,
                std::ptr::null(),
            )
        };

        if handle == INVALID_HANDLE_VALUE {
            let err = std::io::Error::last_os_error();
            return match err.raw_os_error().map(|code| code as u32) {
                Some(ERROR_ACCESS_DENIED) | Some(ERROR_PIPE_BUSY) => {
                    Err(TransportError::AddressInUse { address })
                }
                _ => Err(TransportError::CreationFailed {
                    address,
                    source: err,
                }),
            };
        }

        // SAFETY: `handle` is a freshly created, valid pipe handle that nothing else owns.
        let pipe = unsafe { File::from_raw_handle(handle) };

        info!(%address, "listening on named pipe");

        Ok(Self {
            endpoint: endpoint.clone(),
            pipe: Some(pipe),
            peer: None,
            shutdown: ShutdownHandle::new(address),
            state: ChannelState::Listening,
        })
    }

    fn accept_one(&mut self) -> Result<PeerInfo> {
        if self.shutdown.is_requested() {
            return Err(TransportError::Shutdown);
        }
        if self.state == ChannelState::Connected {
            return Err(TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "channel already has its peer",
            )));
        }
        let pipe = self.pipe.take().ok_or(TransportError::Shutdown)?;

        // SAFETY: the handle is owned by `pipe`, which stays alive across the call;
        // a null OVERLAPPED pointer requests a blocking connect.
        let ok = unsafe { ConnectNamedPipe(pipe.as_raw_handle(), std::ptr::null_mut()) };
        if ok == 0 {
            let err = std::io::Error::last_os_error();
            // A client that connected between create and connect is still a success.
            if err.raw_os_error().map(|code| code as u32) != Some(ERROR_PIPE_CONNECTED) {
                return Err(TransportError::AcceptFailed(err));
            }
        }

        let stream = IpcStream::from_pipe(pipe);
        if self.shutdown.is_requested() || !self.shutdown.arm(stream.try_clone()?) {
            stream.shutdown();
            return Err(TransportError::Shutdown);
        }

        info!(address = %self.endpoint, "peer connected");
        self.peer = Some(stream);
        self.state = ChannelState::Connected;
        Ok(PeerInfo::default())
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
        self.pipe = None;
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
        "named-pipe"
    }
}

impl Drop for PipeChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open-and-drop a client handle so that a blocked `ConnectNamedPipe` returns.
pub(crate) fn wake_listener(address: &str) {
    if let Err(err) = OpenOptions::new().read(true).write(true).open(address) {
        debug!(%address, error = %err, "listener wake found no pipe");
    }
}
