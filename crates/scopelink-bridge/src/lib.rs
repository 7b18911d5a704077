//! Bidirectional packet bridge over a pair of local channels.
//!
//! A [`Bridge`] hosts two single-peer endpoints for one logical name: the
//! [`TransmitEngine`] drains an application-fed [`PacketQueue`] onto the TX
//! endpoint, and the [`ReceiveEngine`] reads frames from the RX endpoint and
//! hands them to a [`PacketHandler`]. Each direction has its own run flag and
//! worker thread and is started and stopped independently.

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod queue;
pub mod receive;
pub mod transmit;

#[cfg(test)]
mod mock;

pub use bridge::Bridge;
pub use config::{BridgeConfig, OversizePolicy, WriteFailurePolicy, DEFAULT_POLL_INTERVAL};
pub use engine::{EngineState, WorkerExit};
pub use error::{BridgeError, Result};
pub use handler::{LogHandler, PacketHandler};
pub use queue::PacketQueue;
pub use receive::ReceiveEngine;
pub use transmit::TransmitEngine;
