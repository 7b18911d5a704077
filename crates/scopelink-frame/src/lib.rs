//! Packet framing for the scopelink bridge.
//!
//! Every message crosses the channel as a 6-byte little-endian header
//! (`command`, `packetID`, `dataSize`) followed by exactly `dataSize`
//! payload bytes. Framing relies on the declared sizes alone, so every
//! declared size is range-checked before it is trusted.

pub mod codec;
pub mod error;
pub mod packet;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_packet, encode_packet, max_payload_for, peek_header, PacketConfig,
    DEFAULT_BUFFER_CAPACITY, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use packet::{Packet, PacketHeader};
pub use reader::PacketReader;
pub use writer::PacketWriter;
