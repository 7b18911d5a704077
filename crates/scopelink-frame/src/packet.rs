use std::fmt;

use bytes::Bytes;

use crate::codec::HEADER_SIZE;

/// The fixed 6-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub command: u16,
    pub packet_id: u16,
    /// Declared payload length. Untrusted when parsed from the wire.
    pub data_size: u16,
}

impl PacketHeader {
    /// Serialize as three little-endian `u16` fields.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..2].copy_from_slice(&self.command.to_le_bytes());
        out[2..4].copy_from_slice(&self.packet_id.to_le_bytes());
        out[4..6].copy_from_slice(&self.data_size.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            command: u16::from_le_bytes([bytes[0], bytes[1]]),
            packet_id: u16::from_le_bytes([bytes[2], bytes[3]]),
            data_size: u16::from_le_bytes([bytes[4], bytes[5]]),
        }
    }
}

/// One framed message.
///
/// `command` and `packet_id` are opaque to the bridge. The wire `dataSize`
/// is never stored; it is always derived from the payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    pub command: u16,
    pub packet_id: u16,
    pub payload: Bytes,
}

impl Packet {
    /// Create a new packet.
    pub fn new(command: u16, packet_id: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            packet_id,
            payload: payload.into(),
        }
    }

    /// Payload length as carried in the header.
    ///
    /// Saturates at `u16::MAX`; encoding rejects such packets before this
    /// value reaches the wire.
    pub fn data_size(&self) -> u16 {
        u16::try_from(self.payload.len()).unwrap_or(u16::MAX)
    }

    pub fn header(&self) -> PacketHeader {
        PacketHeader {
            command: self.command,
            packet_id: self.packet_id,
            data_size: self.data_size(),
        }
    }

    /// The total wire size of this packet (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet {{ id: {:#06X}, command: {}, size: {}, data: [",
            self.packet_id,
            self.command,
            self.payload.len()
        )?;
        for (i, byte) in self.payload.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        f.write_str("] }")
    }
}
