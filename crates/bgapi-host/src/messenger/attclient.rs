//! Attribute Client class (0x04)
//!
//! All discovery and value-access procedures run through this class.
//! Commands answer immediately with `(connection, result)`; the actual
//! results stream in as events and end with `procedure_completed`.

use tokio::sync::broadcast;

use bgapi_core::ble_uuid::BleUuid;
use bgapi_core::error_code::ErrorCode;
use bgapi_core::frame::MessageClass;
use bgapi_core::payload::{DecodeError, PayloadReader, PayloadWriter};
use bgapi_core::types::ConnectionHandle;

use crate::dispatcher::Dispatcher;
use crate::messenger::EventDecode;
use crate::{HostError, Result};

const CMD_READ_BY_GROUP_TYPE: u8 = 0x01;
const CMD_READ_BY_TYPE: u8 = 0x02;
const CMD_FIND_INFORMATION: u8 = 0x03;
const CMD_READ_BY_HANDLE: u8 = 0x04;
const CMD_ATTRIBUTE_WRITE: u8 = 0x05;
const CMD_WRITE_COMMAND: u8 = 0x06;
const CMD_INDICATE_CONFIRM: u8 = 0x07;
const CMD_READ_LONG: u8 = 0x08;

const EVT_INDICATED: u8 = 0x00;
const EVT_PROCEDURE_COMPLETED: u8 = 0x01;
const EVT_GROUP_FOUND: u8 = 0x02;
const EVT_FIND_INFORMATION_FOUND: u8 = 0x04;
const EVT_ATTRIBUTE_VALUE: u8 = 0x05;

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Which procedure produced an `attribute_value` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttributeValueKind {
    Read = 0x00,
    Notify = 0x01,
    Indicate = 0x02,
    ReadByType = 0x03,
    ReadBlob = 0x04,
    IndicateRequiresConfirm = 0x05,
}

impl AttributeValueKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Read),
            0x01 => Some(Self::Notify),
            0x02 => Some(Self::Indicate),
            0x03 => Some(Self::ReadByType),
            0x04 => Some(Self::ReadBlob),
            0x05 => Some(Self::IndicateRequiresConfirm),
            _ => None,
        }
    }
}

/// Unsolicited events from the Attribute Client class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttClientEvent {
    /// Remote confirmed an indication we served (peripheral role).
    Indicated {
        connection: ConnectionHandle,
        attr_handle: u16,
    },
    /// Terminal event of every multi-response procedure.
    ProcedureCompleted {
        connection: ConnectionHandle,
        result: ErrorCode,
        chr_handle: u16,
    },
    /// One grouping record from a read-by-group-type walk.
    GroupFound {
        connection: ConnectionHandle,
        start: u16,
        end: u16,
        uuid: BleUuid,
    },
    /// One record from a find-information walk.
    FindInformationFound {
        connection: ConnectionHandle,
        handle: u16,
        uuid: BleUuid,
    },
    /// An attribute value, tagged with the procedure that produced it.
    AttributeValue {
        connection: ConnectionHandle,
        handle: u16,
        kind: AttributeValueKind,
        value: Vec<u8>,
    },
}

impl EventDecode for AttClientEvent {
    fn decode(id: u8, payload: &[u8]) -> std::result::Result<Option<Self>, DecodeError> {
        let mut r = PayloadReader::new(payload);
        let event = match id {
            EVT_INDICATED => Self::Indicated {
                connection: r.u8()?,
                attr_handle: r.u16_le()?,
            },
            EVT_PROCEDURE_COMPLETED => Self::ProcedureCompleted {
                connection: r.u8()?,
                result: ErrorCode(r.u16_le()?),
                chr_handle: r.u16_le()?,
            },
            EVT_GROUP_FOUND => Self::GroupFound {
                connection: r.u8()?,
                start: r.u16_le()?,
                end: r.u16_le()?,
                uuid: BleUuid::from_wire(r.u8_array()?)?,
            },
            EVT_FIND_INFORMATION_FOUND => Self::FindInformationFound {
                connection: r.u8()?,
                handle: r.u16_le()?,
                uuid: BleUuid::from_wire(r.u8_array()?)?,
            },
            EVT_ATTRIBUTE_VALUE => {
                let connection = r.u8()?;
                let handle = r.u16_le()?;
                let raw_kind = r.u8()?;
                let Some(kind) = AttributeValueKind::from_u8(raw_kind) else {
                    tracing::debug!(raw_kind, "attribute value of unknown kind dropped");
                    return Ok(None);
                };
                Self::AttributeValue {
                    connection,
                    handle,
                    kind,
                    value: r.u8_array()?.to_vec(),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

// ----------------------------------------------------------------------------
// Messenger
// ----------------------------------------------------------------------------

/// Typed commands for the Attribute Client class.
///
/// All procedure starters share the `(connection, result)` response
/// shape; a nonzero result means the procedure never started and no
/// `procedure_completed` will follow.
#[derive(Clone)]
pub struct AttClientMessenger {
    dispatcher: Dispatcher,
}

impl AttClientMessenger {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AttClientEvent> {
        self.dispatcher.events().subscribe_attclient()
    }

    async fn start_procedure(
        &self,
        id: u8,
        payload: bgapi_core::frame::Payload,
    ) -> Result<()> {
        let response = self
            .dispatcher
            .request(MessageClass::AttributeClient, id, payload)
            .await?;
        let mut r = PayloadReader::new(&response);
        let _connection = r.u8()?;
        HostError::check_result(r.u16_le()?)
    }

    /// Walk grouping attributes (e.g. primary services, 0x2800).
    pub async fn read_by_group_type(
        &self,
        connection: ConnectionHandle,
        start: u16,
        end: u16,
        uuid: BleUuid,
    ) -> Result<()> {
        let payload = PayloadWriter::new()
            .u8(connection)
            .u16_le(start)
            .u16_le(end)
            .u8_array(&uuid.to_wire())
            .finish();
        self.start_procedure(CMD_READ_BY_GROUP_TYPE, payload).await
    }

    /// Read every attribute of a type within a handle range (e.g.
    /// characteristic declarations, 0x2803).
    pub async fn read_by_type(
        &self,
        connection: ConnectionHandle,
        start: u16,
        end: u16,
        uuid: BleUuid,
    ) -> Result<()> {
        let payload = PayloadWriter::new()
            .u8(connection)
            .u16_le(start)
            .u16_le(end)
            .u8_array(&uuid.to_wire())
            .finish();
        self.start_procedure(CMD_READ_BY_TYPE, payload).await
    }

    /// Enumerate every attribute handle and type in a range.
    pub async fn find_information(
        &self,
        connection: ConnectionHandle,
        start: u16,
        end: u16,
    ) -> Result<()> {
        let payload = PayloadWriter::new()
            .u8(connection)
            .u16_le(start)
            .u16_le(end)
            .finish();
        self.start_procedure(CMD_FIND_INFORMATION, payload).await
    }

    /// Read a single attribute value.
    pub async fn read_by_handle(&self, connection: ConnectionHandle, handle: u16) -> Result<()> {
        let payload = PayloadWriter::new().u8(connection).u16_le(handle).finish();
        self.start_procedure(CMD_READ_BY_HANDLE, payload).await
    }

    /// Read an attribute longer than a single packet, blob by blob.
    pub async fn read_long(&self, connection: ConnectionHandle, handle: u16) -> Result<()> {
        let payload = PayloadWriter::new().u8(connection).u16_le(handle).finish();
        self.start_procedure(CMD_READ_LONG, payload).await
    }

    /// Acknowledged write; completion arrives as `procedure_completed`.
    pub async fn attribute_write(
        &self,
        connection: ConnectionHandle,
        handle: u16,
        data: &[u8],
    ) -> Result<()> {
        let payload = PayloadWriter::new()
            .u8(connection)
            .u16_le(handle)
            .u8_array(data)
            .finish();
        self.start_procedure(CMD_ATTRIBUTE_WRITE, payload).await
    }

    /// Unacknowledged write, fire-and-forget.
    pub async fn write_command(
        &self,
        connection: ConnectionHandle,
        handle: u16,
        data: &[u8],
    ) -> Result<()> {
        let payload = PayloadWriter::new()
            .u8(connection)
            .u16_le(handle)
            .u8_array(data)
            .finish();
        self.dispatcher
            .send(MessageClass::AttributeClient, CMD_WRITE_COMMAND, payload)
            .await
    }

    /// Confirm a received indication.
    pub async fn indicate_confirm(&self, connection: ConnectionHandle) -> Result<()> {
        let payload = PayloadWriter::new().u8(connection).finish();
        let response = self
            .dispatcher
            .request(MessageClass::AttributeClient, CMD_INDICATE_CONFIRM, payload)
            .await?;
        let mut r = PayloadReader::new(&response);
        HostError::check_result(r.u16_le()?)
    }
}
