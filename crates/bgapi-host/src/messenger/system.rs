//! System class (0x00)

use tokio::sync::broadcast;

use bgapi_core::error_code::ErrorCode;
use bgapi_core::frame::{MessageClass, Payload};
use bgapi_core::payload::{DecodeError, PayloadReader, PayloadWriter};
use bgapi_core::types::BdAddr;

use crate::dispatcher::Dispatcher;
use crate::messenger::EventDecode;
use crate::Result;

const CMD_RESET: u8 = 0x00;
const CMD_HELLO: u8 = 0x01;
const CMD_ADDRESS_GET: u8 = 0x02;

const EVT_BOOT: u8 = 0x00;
const EVT_NO_LICENSE_KEY: u8 = 0x05;
const EVT_PROTOCOL_ERROR: u8 = 0x06;

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Unsolicited events from the System class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    /// Module (re)booted and reports its firmware versions.
    Boot {
        major: u16,
        minor: u16,
        patch: u16,
        build: u16,
        ll_version: u16,
        protocol_version: u8,
        hw: u8,
    },
    NoLicenseKey,
    /// The module rejected a frame it could not parse.
    ProtocolError { reason: ErrorCode },
}

impl EventDecode for SystemEvent {
    fn decode(id: u8, payload: &[u8]) -> std::result::Result<Option<Self>, DecodeError> {
        let mut r = PayloadReader::new(payload);
        let event = match id {
            EVT_BOOT => Self::Boot {
                major: r.u16_le()?,
                minor: r.u16_le()?,
                patch: r.u16_le()?,
                build: r.u16_le()?,
                ll_version: r.u16_le()?,
                protocol_version: r.u8()?,
                hw: r.u8()?,
            },
            EVT_NO_LICENSE_KEY => Self::NoLicenseKey,
            EVT_PROTOCOL_ERROR => Self::ProtocolError {
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

/// Typed commands for the System class.
#[derive(Clone)]
pub struct SystemMessenger {
    dispatcher: Dispatcher,
}

impl SystemMessenger {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.dispatcher.events().subscribe_system()
    }

    /// Liveness check; the module echoes an empty response.
    pub async fn hello(&self) -> Result<()> {
        self.dispatcher
            .request(MessageClass::System, CMD_HELLO, Payload::new())
            .await?;
        Ok(())
    }

    /// The module's own Bluetooth address.
    pub async fn address_get(&self) -> Result<BdAddr> {
        let payload = self
            .dispatcher
            .request(MessageClass::System, CMD_ADDRESS_GET, Payload::new())
            .await?;
        Ok(PayloadReader::new(&payload).bd_addr()?)
    }

    /// Reboot the module. No response is ever sent; a `Boot` event
    /// follows once the module is back up.
    pub async fn reset(&self, boot_in_dfu: bool) -> Result<()> {
        let payload = PayloadWriter::new().u8(boot_in_dfu as u8).finish();
        self.dispatcher
            .send(MessageClass::System, CMD_RESET, payload)
            .await
    }
}
