//! Per-class protocol messengers
//!
//! One module per BGAPI class. Each messenger is a thin typed layer over
//! the dispatcher: command methods lay out a payload, issue it, and
//! decode the response; event enums decode `(id, payload)` pairs for the
//! broadcast bus. All byte layouts follow the vendor's wire-format
//! tables; nothing here carries procedure state, that lives in
//! [`crate::central`].

use bgapi_core::payload::DecodeError;

pub mod attclient;
pub mod connection;
pub mod gap;
pub mod system;

pub use attclient::{AttClientEvent, AttClientMessenger, AttributeValueKind};
pub use connection::{ConnectionEvent, ConnectionMessenger};
pub use gap::{DiscoverMode, GapEvent, GapMessenger};
pub use system::{SystemEvent, SystemMessenger};

/// Decoding contract for one class's event set.
///
/// `Ok(None)` means the id is unknown to this client and the event should
/// be dropped; a decode error means the payload did not match the schema
/// for a known id.
pub trait EventDecode: Clone + Send + 'static + Sized {
    fn decode(id: u8, payload: &[u8]) -> Result<Option<Self>, DecodeError>;
}
