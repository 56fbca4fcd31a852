//! BGAPI wire-format layer
//!
//! This crate implements the transport-independent half of a BGAPI host
//! client: the 4-byte-header frame format and its resynchronizing parser,
//! the 16-bit protocol error-code space, Bluetooth UUID expansion, and
//! advertisement payload parsing. It performs no I/O and holds no async
//! state; the `bgapi-host` crate builds the dispatcher and discovery
//! engine on top of it.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod advert;
pub mod ble_uuid;
pub mod error_code;
pub mod frame;
pub mod payload;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use advert::Advertisement;
pub use ble_uuid::BleUuid;
pub use error_code::ErrorCode;
pub use frame::{FrameError, FrameParser, Message, MessageClass, MessageKind, Payload};
pub use payload::{DecodeError, PayloadReader, PayloadWriter};
pub use types::{AddressType, BdAddr, CharacteristicProperties, ConnectionHandle};
