//! Bluetooth UUID handling
//!
//! GATT attributes are typed by UUID in one of two wire forms: a 16-bit
//! shorthand for SIG-assigned values, or a full 128-bit value. Both travel
//! little-endian on the wire. The shorthand expands onto the Bluetooth
//! base UUID with bytes 2..4 replaced by the short value.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payload::DecodeError;

/// The Bluetooth base UUID, big-endian: 00000000-0000-1000-8000-00805F9B34FB.
const BASE_UUID: [u8; 16] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5f, 0x9b, 0x34, 0xfb,
];

// Well-known 16-bit attribute types used by the discovery engine.
pub const PRIMARY_SERVICE: u16 = 0x2800;
pub const CHARACTERISTIC_DECLARATION: u16 = 0x2803;
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: u16 = 0x2902;

/// A GATT UUID in either its short or full form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BleUuid {
    Short(u16),
    Full(Uuid),
}

impl BleUuid {
    /// Parse from the little-endian wire bytes of a uuid field.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, DecodeError> {
        match bytes.len() {
            2 => Ok(Self::Short(u16::from_le_bytes([bytes[0], bytes[1]]))),
            16 => {
                let mut be = [0u8; 16];
                for (i, b) in bytes.iter().rev().enumerate() {
                    be[i] = *b;
                }
                Ok(Self::Full(Uuid::from_bytes(be)))
            }
            len => Err(DecodeError::BadUuidLength { len }),
        }
    }

    /// Serialize back to little-endian wire bytes.
    pub fn to_wire(self) -> Vec<u8> {
        match self {
            Self::Short(v) => v.to_le_bytes().to_vec(),
            Self::Full(uuid) => {
                let mut bytes = *uuid.as_bytes();
                bytes.reverse();
                bytes.to_vec()
            }
        }
    }

    /// Expand to the full 128-bit logical UUID.
    pub fn expand(self) -> Uuid {
        match self {
            Self::Full(uuid) => uuid,
            Self::Short(v) => {
                let mut bytes = BASE_UUID;
                bytes[2..4].copy_from_slice(&v.to_be_bytes());
                Uuid::from_bytes(bytes)
            }
        }
    }

    /// Re-derive the 16-bit shorthand when the UUID sits on the base.
    pub fn shorten(uuid: Uuid) -> Option<u16> {
        let bytes = uuid.as_bytes();
        let mut on_base = bytes[0] == 0 && bytes[1] == 0;
        on_base &= bytes[4..] == BASE_UUID[4..];
        if on_base {
            Some(u16::from_be_bytes([bytes[2], bytes[3]]))
        } else {
            None
        }
    }

    /// Equality against a logical UUID regardless of representation.
    pub fn matches(self, other: Uuid) -> bool {
        self.expand() == other
    }
}

impl From<u16> for BleUuid {
    fn from(v: u16) -> Self {
        Self::Short(v)
    }
}

impl From<Uuid> for BleUuid {
    fn from(uuid: Uuid) -> Self {
        match Self::shorten(uuid) {
            Some(v) => Self::Short(v),
            None => Self::Full(uuid),
        }
    }
}

impl fmt::Display for BleUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short(v) => write!(f, "0x{v:04X}"),
            Self::Full(uuid) => write!(f, "{uuid}"),
        }
    }
}
