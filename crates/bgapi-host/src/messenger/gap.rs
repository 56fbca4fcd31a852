//! GAP class (0x06)

use tokio::sync::broadcast;

use bgapi_core::frame::MessageClass;
use bgapi_core::payload::{DecodeError, PayloadReader, PayloadWriter};
use bgapi_core::types::{AddressType, BdAddr, ConnectionHandle};

use crate::dispatcher::Dispatcher;
use crate::messenger::EventDecode;
use crate::{HostError, Result};

const CMD_SET_MODE: u8 = 0x01;
const CMD_DISCOVER: u8 = 0x02;
const CMD_CONNECT_DIRECT: u8 = 0x03;
const CMD_END_PROCEDURE: u8 = 0x04;
const CMD_SET_SCAN_PARAMETERS: u8 = 0x07;

const EVT_SCAN_RESPONSE: u8 = 0x00;
const EVT_MODE_CHANGED: u8 = 0x01;

/// Bond byte value meaning "no bond".
const NO_BOND: u8 = 0xff;

// ----------------------------------------------------------------------------
// Discover Mode
// ----------------------------------------------------------------------------

/// Scan breadth for `gap discover`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum DiscoverMode {
    /// Only devices advertising as limited-discoverable.
    Limited = 0x00,
    /// Limited and generic discoverable devices.
    #[default]
    Generic = 0x01,
    /// Every observable advertisement.
    Observation = 0x02,
}

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Unsolicited events from the GAP class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GapEvent {
    /// One advertisement or scan response heard while discovering.
    ScanResponse {
        rssi: i8,
        packet_type: u8,
        sender: BdAddr,
        address_type: Option<AddressType>,
        bond: Option<u8>,
        data: Vec<u8>,
    },
    ModeChanged { discover: u8, connect: u8 },
}

impl EventDecode for GapEvent {
    fn decode(id: u8, payload: &[u8]) -> std::result::Result<Option<Self>, DecodeError> {
        let mut r = PayloadReader::new(payload);
        let event = match id {
            EVT_SCAN_RESPONSE => Self::ScanResponse {
                rssi: r.i8()?,
                packet_type: r.u8()?,
                sender: r.bd_addr()?,
                address_type: AddressType::from_u8(r.u8()?),
                bond: match r.u8()? {
                    NO_BOND => None,
                    handle => Some(handle),
                },
                data: r.u8_array()?.to_vec(),
            },
            EVT_MODE_CHANGED => Self::ModeChanged {
                discover: r.u8()?,
                connect: r.u8()?,
            },
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

// ----------------------------------------------------------------------------
// Messenger
// ----------------------------------------------------------------------------

/// Typed commands for the GAP class.
#[derive(Clone)]
pub struct GapMessenger {
    dispatcher: Dispatcher,
}

impl GapMessenger {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GapEvent> {
        self.dispatcher.events().subscribe_gap()
    }

    /// Set discoverability / connectability of the local device.
    pub async fn set_mode(&self, discover: u8, connect: u8) -> Result<()> {
        let payload = PayloadWriter::new().u8(discover).u8(connect).finish();
        let response = self
            .dispatcher
            .request(MessageClass::Gap, CMD_SET_MODE, payload)
            .await?;
        HostError::check_result(PayloadReader::new(&response).u16_le()?)
    }

    /// Start scanning; `scan_response` events follow until ended.
    pub async fn discover(&self, mode: DiscoverMode) -> Result<()> {
        let payload = PayloadWriter::new().u8(mode as u8).finish();
        let response = self
            .dispatcher
            .request(MessageClass::Gap, CMD_DISCOVER, payload)
            .await?;
        HostError::check_result(PayloadReader::new(&response).u16_le()?)
    }

    /// Initiate a direct connection. The response only acknowledges that
    /// the attempt started; the handle it carries becomes real once the
    /// matching `connection status` event arrives.
    #[allow(clippy::too_many_arguments)]
    pub async fn connect_direct(
        &self,
        address: BdAddr,
        address_type: AddressType,
        conn_interval_min: u16,
        conn_interval_max: u16,
        timeout: u16,
        latency: u16,
    ) -> Result<ConnectionHandle> {
        let payload = PayloadWriter::new()
            .bd_addr(address)
            .u8(address_type as u8)
            .u16_le(conn_interval_min)
            .u16_le(conn_interval_max)
            .u16_le(timeout)
            .u16_le(latency)
            .finish();
        let response = self
            .dispatcher
            .request(MessageClass::Gap, CMD_CONNECT_DIRECT, payload)
            .await?;
        let mut r = PayloadReader::new(&response);
        HostError::check_result(r.u16_le()?)?;
        Ok(r.u8()?)
    }

    /// Abort the running GAP procedure (scan or pending connect).
    pub async fn end_procedure(&self) -> Result<()> {
        let response = self
            .dispatcher
            .request(MessageClass::Gap, CMD_END_PROCEDURE, bgapi_core::frame::Payload::new())
            .await?;
        HostError::check_result(PayloadReader::new(&response).u16_le()?)
    }

    /// Scan interval/window in 625us units, and active vs. passive.
    pub async fn set_scan_parameters(
        &self,
        scan_interval: u16,
        scan_window: u16,
        active: bool,
    ) -> Result<()> {
        let payload = PayloadWriter::new()
            .u16_le(scan_interval)
            .u16_le(scan_window)
            .u8(active as u8)
            .finish();
        let response = self
            .dispatcher
            .request(MessageClass::Gap, CMD_SET_SCAN_PARAMETERS, payload)
            .await?;
        HostError::check_result(PayloadReader::new(&response).u16_le()?)
    }
}
