//! Connection class (0x03)

use tokio::sync::broadcast;

use bgapi_core::error_code::ErrorCode;
use bgapi_core::frame::MessageClass;
use bgapi_core::payload::{DecodeError, PayloadReader, PayloadWriter};
use bgapi_core::types::{AddressType, BdAddr, ConnectionHandle};

use crate::dispatcher::Dispatcher;
use crate::messenger::EventDecode;
use crate::{HostError, Result};

const CMD_DISCONNECT: u8 = 0x00;
const CMD_GET_RSSI: u8 = 0x01;
const CMD_UPDATE: u8 = 0x02;

const EVT_STATUS: u8 = 0x00;
const EVT_VERSION_IND: u8 = 0x01;
const EVT_FEATURE_IND: u8 = 0x02;
const EVT_DISCONNECTED: u8 = 0x04;

// Status flag bits.
pub const FLAG_CONNECTED: u8 = 0x01;
pub const FLAG_ENCRYPTED: u8 = 0x02;
pub const FLAG_COMPLETED: u8 = 0x04;
pub const FLAG_PARAMETERS_CHANGED: u8 = 0x08;

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Unsolicited events from the Connection class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connection state snapshot; sent on establishment and on every
    /// parameter change. The `flags` field says which (see `FLAG_*`).
    Status {
        connection: ConnectionHandle,
        flags: u8,
        address: BdAddr,
        address_type: Option<AddressType>,
        conn_interval: u16,
        timeout: u16,
        latency: u16,
        bonding: u8,
    },
    VersionInd {
        connection: ConnectionHandle,
        vers_nr: u8,
        comp_id: u16,
        sub_vers_nr: u16,
    },
    FeatureInd {
        connection: ConnectionHandle,
        features: Vec<u8>,
    },
    /// Link dropped; `reason` distinguishes local teardown from loss.
    Disconnected {
        connection: ConnectionHandle,
        reason: ErrorCode,
    },
}

impl EventDecode for ConnectionEvent {
    fn decode(id: u8, payload: &[u8]) -> std::result::Result<Option<Self>, DecodeError> {
        let mut r = PayloadReader::new(payload);
        let event = match id {
            EVT_STATUS => Self::Status {
                connection: r.u8()?,
                flags: r.u8()?,
                address: r.bd_addr()?,
                address_type: AddressType::from_u8(r.u8()?),
                conn_interval: r.u16_le()?,
                timeout: r.u16_le()?,
                latency: r.u16_le()?,
                bonding: r.u8()?,
            },
            EVT_VERSION_IND => Self::VersionInd {
                connection: r.u8()?,
                vers_nr: r.u8()?,
                comp_id: r.u16_le()?,
                sub_vers_nr: r.u16_le()?,
            },
            EVT_FEATURE_IND => Self::FeatureInd {
                connection: r.u8()?,
                features: r.u8_array()?.to_vec(),
            },
            EVT_DISCONNECTED => Self::Disconnected {
                connection: r.u8()?,
                reason: ErrorCode(r.u16_le()?),
            },
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

// ----------------------------------------------------------------------------
// Messenger
// ----------------------------------------------------------------------------

/// Typed commands for the Connection class.
#[derive(Clone)]
pub struct ConnectionMessenger {
    dispatcher: Dispatcher,
}

impl ConnectionMessenger {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.dispatcher.events().subscribe_connection()
    }

    /// Tear a link down. The `Disconnected` event follows asynchronously.
    pub async fn disconnect(&self, connection: ConnectionHandle) -> Result<()> {
        let payload = PayloadWriter::new().u8(connection).finish();
        let response = self
            .dispatcher
            .request(MessageClass::Connection, CMD_DISCONNECT, payload)
            .await?;
        let mut r = PayloadReader::new(&response);
        let _connection = r.u8()?;
        HostError::check_result(r.u16_le()?)
    }

    /// Latest RSSI for an established link, in dBm.
    pub async fn get_rssi(&self, connection: ConnectionHandle) -> Result<i8> {
        let payload = PayloadWriter::new().u8(connection).finish();
        let response = self
            .dispatcher
            .request(MessageClass::Connection, CMD_GET_RSSI, payload)
            .await?;
        let mut r = PayloadReader::new(&response);
        let _connection = r.u8()?;
        Ok(r.i8()?)
    }

    /// Request new connection parameters.
    pub async fn update(
        &self,
        connection: ConnectionHandle,
        interval_min: u16,
        interval_max: u16,
        latency: u16,
        timeout: u16,
    ) -> Result<()> {
        let payload = PayloadWriter::new()
            .u8(connection)
            .u16_le(interval_min)
            .u16_le(interval_max)
            .u16_le(latency)
            .u16_le(timeout)
            .finish();
        let response = self
            .dispatcher
            .request(MessageClass::Connection, CMD_UPDATE, payload)
            .await?;
        let mut r = PayloadReader::new(&response);
        let _connection = r.u8()?;
        HostError::check_result(r.u16_le()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_status_event() {
        let mut payload = vec![3, FLAG_CONNECTED | FLAG_COMPLETED];
        payload.extend_from_slice(&[0xff, 0xee, 0xdd, 0xcc, 0xbb, 0xaa]); // wire order
        payload.extend_from_slice(&[0x00, 0x30, 0x00, 0x64, 0x00, 0x00, 0x00, 0xff]);

        let event = ConnectionEvent::decode(EVT_STATUS, &payload).unwrap().unwrap();
        let ConnectionEvent::Status { connection, flags, address, address_type, .. } = event else {
            panic!("wrong event variant");
        };
        assert_eq!(connection, 3);
        assert_ne!(flags & FLAG_CONNECTED, 0);
        assert_eq!(address.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(address_type, Some(AddressType::Public));
    }

    #[test]
    fn decodes_disconnected_event() {
        let event = ConnectionEvent::decode(EVT_DISCONNECTED, &[3, 0x13, 0x02])
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            ConnectionEvent::Disconnected { connection: 3, reason: ErrorCode(0x0213) }
        );
    }

    #[test]
    fn truncated_disconnected_event_fails() {
        assert!(ConnectionEvent::decode(EVT_DISCONNECTED, &[3, 0x13]).is_err());
    }
}
