//! Async host-side BGAPI client
//!
//! This crate drives a BLE radio module over any duplex byte channel.
//! A dispatcher task owns the transport and the frame parser, correlates
//! command responses, and fans events out to per-class subscribers; the
//! [`Central`] engine builds multi-round-trip GATT procedures (connect,
//! service and characteristic discovery, notification configuration,
//! reads and writes) on top of it.
//!
//! ```no_run
//! # async fn run() -> bgapi_host::Result<()> {
//! use bgapi_host::{Central, HostConfig};
//! use bgapi_host::transport::channel_transport;
//!
//! let (transport, _peer) = channel_transport(64);
//! let central = Central::new(transport, HostConfig::default());
//!
//! let peripheral = central.connect("AA:BB:CC:DD:EE:FF".parse().unwrap(), Default::default()).await?;
//! let services = central.discover_services(&peripheral).await?;
//! # Ok(())
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod central;
pub mod config;
pub mod dispatcher;
pub mod messenger;
pub mod transport;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use central::{
    Central, Characteristic, ClientConfiguration, ConnectionLost, DiscoveredDevice, GattService,
    Peripheral, WriteMode,
};
pub use config::HostConfig;
pub use dispatcher::{Dispatcher, EventBus};
pub use transport::Transport;

use bgapi_core::error_code::ErrorCode;
use bgapi_core::payload::DecodeError;
use bgapi_core::types::ConnectionHandle;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Failures surfaced by host operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The module answered with a nonzero result word.
    #[error("protocol error {0}")]
    Protocol(ErrorCode),

    /// A response or event payload did not match its schema.
    #[error("payload decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// The connection dropped while an operation was still suspended on it.
    #[error("connection {connection} lost while the operation was in flight")]
    ConnectionLost { connection: ConnectionHandle },

    /// The byte channel to the module closed.
    #[error("transport closed")]
    TransportClosed,

    /// Transport-level send failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A suspension point outlived its client-side deadline.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    /// Outbound payload over the single-packet limit.
    #[error("payload of {len} bytes exceeds the {max}-byte limit, chunk it before writing")]
    PayloadTooLarge { len: usize, max: usize },

    /// An event subscriber fell behind the broadcast bus.
    #[error("event subscriber lagged, {missed} event(s) were dropped")]
    EventStreamLagged { missed: u64 },

    /// No peripheral for the handle (already disconnected or never connected).
    #[error("unknown connection handle {connection}")]
    UnknownPeripheral { connection: ConnectionHandle },

    /// The characteristic carries no descriptor required by the operation.
    #[error("characteristic has no client configuration descriptor")]
    NoConfigurationDescriptor,
}

impl HostError {
    /// Fold a nonzero result word into a protocol error.
    pub(crate) fn check_result(code: u16) -> Result<()> {
        ErrorCode(code).into_result().map_err(HostError::Protocol)
    }
}

pub type Result<T> = std::result::Result<T, HostError>;
