/// Errors that can occur on a bridge channel transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Another live endpoint already owns this address.
    #[error("address already in use: {address}")]
    AddressInUse { address: String },

    /// The endpoint could not be created at the specified address.
    #[error("failed to create endpoint {address}: {source}")]
    CreationFailed {
        address: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address (peer side).
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    /// Failed to accept the single peer connection.
    #[error("failed to accept connection: {0}")]
    AcceptFailed(std::io::Error),

    /// The peer closed its end of the channel.
    #[error("peer disconnected")]
    Disconnected,

    /// The OS reported that no data is available yet. Callers retry.
    #[error("no data available yet")]
    TransientRetry,

    /// An I/O operation was attempted before a peer was accepted.
    #[error("channel has no connected peer")]
    NotConnected,

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {address}")]
    PathTooLong {
        address: String,
        len: usize,
        max: usize,
    },

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Whether this error means the peer is gone for good.
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::Disconnected | TransportError::Shutdown => true,
            TransportError::Io(err) => is_disconnect_kind(err.kind()),
            _ => false,
        }
    }
}

pub(crate) fn is_disconnect_kind(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::UnexpectedEof
    )
}

pub type Result<T> = std::result::Result<T, TransportError>;
