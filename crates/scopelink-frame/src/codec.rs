use bytes::{Buf, BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::packet::{Packet, PacketHeader};

/// Frame header: command (2) + packet id (2) + data size (2) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Default transport buffer capacity, header included.
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// Default maximum payload size: buffer capacity minus the header.
pub const DEFAULT_MAX_PAYLOAD: usize = DEFAULT_BUFFER_CAPACITY - HEADER_SIZE;

/// Largest payload a buffer of `capacity` bytes can carry.
///
/// Clamped to what the 16-bit `dataSize` field can express.
pub fn max_payload_for(capacity: usize) -> usize {
    capacity
        .saturating_sub(HEADER_SIZE)
        .min(u16::MAX as usize)
}

/// Encode a packet into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬──────────────┬──────────────────┐
/// │ Command      │ Packet ID    │ Data size    │ Payload          │
/// │ (2B LE)      │ (2B LE)      │ (2B LE)      │ (Data size B)    │
/// └──────────────┴──────────────┴──────────────┴──────────────────┘
/// ```
///
/// No magic, no checksum, no terminator: the receiver relies on the
/// declared sizes alone.
pub fn encode_packet(packet: &Packet, dst: &mut BytesMut, max_payload: usize) -> Result<()> {
    let size = packet.payload.len();
    let max = max_payload.min(u16::MAX as usize);
    if size > max {
        return Err(FrameError::PayloadTooLarge { size, max });
    }
    dst.reserve(HEADER_SIZE + size);
    dst.put_slice(&packet.header().encode());
    dst.put_slice(&packet.payload);
    Ok(())
}

/// Decode a packet from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete packet yet.
/// A header declaring more than `max_payload` bytes is rejected before any
/// payload is buffered. On success, consumes the packet bytes.
pub fn decode_packet(src: &mut BytesMut, max_payload: usize) -> Result<Option<Packet>> {
    let Some(header) = peek_header(src) else {
        return Ok(None); // Need more data
    };

    let size = header.data_size as usize;
    if size > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + size {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(size).freeze();

    Ok(Some(Packet {
        command: header.command,
        packet_id: header.packet_id,
        payload,
    }))
}

/// Parse the header at the front of `src` without consuming it.
pub fn peek_header(src: &[u8]) -> Option<PacketHeader> {
    let bytes: &[u8; HEADER_SIZE] = src.get(..HEADER_SIZE)?.try_into().ok()?;
    Some(PacketHeader::decode(bytes))
}

/// Configuration for the packet reader/writer.
#[derive(Debug, Clone)]
pub struct PacketConfig {
    /// Maximum payload size in bytes. Default: 4090.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
