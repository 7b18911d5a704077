//! Local packet bridge between a data-acquisition engine and its UI process.
//!
//! scopelink moves opaque, length-framed packets over a pair of single-peer
//! local channels (Unix domain sockets or Windows named pipes), one per
//! direction.
//!
//! # Crate Structure
//!
//! - [`transport`]: single-peer channel abstraction (UDS, named pipes)
//! - [`frame`]: the 6-byte header packet format
//! - [`bridge`]: transmit/receive engines and the bridge facade (behind `bridge` feature)

/// Re-export transport types.
pub mod transport {
    pub use scopelink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use scopelink_frame::*;
}

/// Re-export bridge types (requires `bridge` feature).
#[cfg(feature = "bridge")]
pub mod bridge {
    pub use scopelink_bridge::*;
}
