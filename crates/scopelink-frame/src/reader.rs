use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use scopelink_transport::IpcStream;
use tracing::trace;

use crate::codec::{decode_packet, PacketConfig, DEFAULT_BUFFER_CAPACITY};
use crate::error::{FrameError, Result};
use crate::packet::Packet;

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads complete packets from any `Read` stream.
///
/// Handles partial reads internally — callers always get complete packets.
/// This is the peer-side counterpart of the bridge's receive loop.
pub struct PacketReader<T> {
    inner: T,
    buf: BytesMut,
    config: PacketConfig,
}

impl<T: Read> PacketReader<T> {
    /// Create a new packet reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, PacketConfig::default())
    }

    /// Create a new packet reader with explicit configuration.
    pub fn with_config(inner: T, config: PacketConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(DEFAULT_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete packet (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if let Some(packet) = decode_packet(&mut self.buf, self.config.max_payload_size)? {
                trace!(
                    command = packet.command,
                    packet_id = packet.packet_id,
                    size = packet.payload.len(),
                    "decoded packet"
                );
                return Ok(packet);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current packet reader configuration.
    pub fn config(&self) -> &PacketConfig {
        &self.config
    }
}

impl PacketReader<IpcStream> {
    /// Create a packet reader for `IpcStream` and apply read timeout from config.
    pub fn with_config_ipc(inner: IpcStream, config: PacketConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: scopelink_transport::TransportError) -> FrameError {
    match err {
        scopelink_transport::TransportError::Io(io)
        | scopelink_transport::TransportError::AcceptFailed(io) => FrameError::Io(io),
        scopelink_transport::TransportError::CreationFailed { source, .. }
        | scopelink_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        scopelink_transport::TransportError::Disconnected => FrameError::ConnectionClosed,
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
