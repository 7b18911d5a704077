use scopelink_transport::TransportError;

/// Errors that can occur in bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Transport-level error (endpoint setup, accept, I/O).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Packet encoding/decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] scopelink_frame::FrameError),

    /// A received header declared more payload than the buffer can hold.
    #[error("declared payload of {declared} bytes exceeds maximum {max}")]
    OversizePayload { declared: usize, max: usize },

    /// Writing one packet to the peer failed.
    #[error("write failed: {0}")]
    WriteFailed(#[source] TransportError),

    /// The bridge configuration cannot be used.
    #[error("invalid bridge configuration: {0}")]
    InvalidConfig(String),

    /// The worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),

    /// The worker thread panicked; it has been reaped.
    #[error("{0} worker thread panicked")]
    WorkerPanicked(&'static str),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
