//! Single-peer local channel transport.
//!
//! Provides one contract, [`ChannelTransport`], over two local transport
//! mechanisms:
//! - Unix domain sockets (Linux/macOS)
//! - Named pipes (Windows)
//!
//! A channel binds an [`Endpoint`], accepts exactly one peer for its whole
//! run, and moves raw bytes. This is the lowest layer of scopelink.

pub mod channel;
pub mod endpoint;
pub mod error;
pub mod stream;

#[cfg(windows)]
pub mod pipe;
#[cfg(unix)]
pub mod uds;

pub use channel::{ChannelOptions, ChannelState, ChannelTransport, PeerInfo, ShutdownHandle};
pub use endpoint::{Direction, Endpoint, DEFAULT_BASE_PATH};
pub use error::{Result, TransportError};
pub use stream::IpcStream;

#[cfg(windows)]
pub use pipe::PipeChannel;
#[cfg(unix)]
pub use uds::UnixChannel;

/// The channel implementation for the build target.
#[cfg(unix)]
pub type NativeChannel = UnixChannel;
/// The channel implementation for the build target.
#[cfg(windows)]
pub type NativeChannel = PipeChannel;

/// Connect to a bridge endpoint as its peer.
pub fn connect(endpoint: &Endpoint) -> Result<IpcStream> {
    #[cfg(unix)]
    {
        UnixChannel::connect(endpoint)
    }
    #[cfg(windows)]
    {
        PipeChannel::connect(endpoint)
    }
}
