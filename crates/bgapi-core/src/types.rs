//! Shared protocol value types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Connection handle assigned by the module, one per established link.
pub type ConnectionHandle = u8;

// ----------------------------------------------------------------------------
// Device Address
// ----------------------------------------------------------------------------

/// A 48-bit Bluetooth device address.
///
/// Stored in display order (most significant byte first). The wire form
/// is little-endian, so [`BdAddr::from_wire`] and [`BdAddr::to_wire`]
/// reverse the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BdAddr([u8; 6]);

impl BdAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Reassemble from the little-endian wire order.
    pub fn from_wire(mut raw: [u8; 6]) -> Self {
        raw.reverse();
        Self(raw)
    }

    /// Serialize to the little-endian wire order.
    pub fn to_wire(self) -> [u8; 6] {
        let mut raw = self.0;
        raw.reverse();
        raw
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Invalid textual device address.
#[derive(Debug, thiserror::Error)]
#[error("invalid device address: {0:?}")]
pub struct AddrParseError(String);

impl FromStr for BdAddr {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(AddrParseError(s.to_string()));
        }
        let mut bytes = [0u8; 6];
        for (out, part) in bytes.iter_mut().zip(parts) {
            let mut decoded = [0u8; 1];
            hex::decode_to_slice(part, &mut decoded).map_err(|_| AddrParseError(s.to_string()))?;
            *out = decoded[0];
        }
        Ok(Self(bytes))
    }
}

// ----------------------------------------------------------------------------
// Address Type
// ----------------------------------------------------------------------------

/// GAP address type, carried alongside every address on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AddressType {
    #[default]
    Public = 0x00,
    Random = 0x01,
}

impl AddressType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Public),
            0x01 => Some(Self::Random),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Characteristic Properties
// ----------------------------------------------------------------------------

/// Property bitmask from a GATT characteristic declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicProperties(u8);

impl CharacteristicProperties {
    pub const BROADCAST: u8 = 0x01;
    pub const READ: u8 = 0x02;
    pub const WRITE_WITHOUT_RESPONSE: u8 = 0x04;
    pub const WRITE: u8 = 0x08;
    pub const NOTIFY: u8 = 0x10;
    pub const INDICATE: u8 = 0x20;
    pub const AUTHENTICATED_WRITE: u8 = 0x40;
    pub const EXTENDED: u8 = 0x80;

    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    pub fn to_byte(self) -> u8 {
        self.0
    }

    pub fn contains(self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    pub fn can_read(self) -> bool {
        self.contains(Self::READ)
    }

    pub fn can_write(self) -> bool {
        self.contains(Self::WRITE)
    }

    pub fn can_notify(self) -> bool {
        self.contains(Self::NOTIFY)
    }

    pub fn can_indicate(self) -> bool {
        self.contains(Self::INDICATE)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
