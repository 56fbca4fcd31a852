//! Central role: connection and GATT discovery engine
//!
//! Presents connect, discovery, notification configuration, reads,
//! writes, and disconnect as single async operations, each built from
//! the underlying command/event round trips. Per-connection state lives
//! in a shared peripheral map maintained by a monitor task: entries
//! appear on successful connection and are evicted on `disconnected`.
//!
//! Every suspension point carries a client-side deadline, and every
//! accumulating procedure also watches for its connection dropping, so
//! a dead link fails operations instead of hanging them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;

use bgapi_core::advert::Advertisement;
use bgapi_core::ble_uuid::{self, BleUuid};
use bgapi_core::error_code::ErrorCode;
use bgapi_core::payload::PayloadReader;
use bgapi_core::types::{AddressType, BdAddr, CharacteristicProperties, ConnectionHandle};

use crate::config::HostConfig;
use crate::dispatcher::Dispatcher;
use crate::messenger::attclient::{AttClientEvent, AttClientMessenger, AttributeValueKind};
use crate::messenger::connection::{ConnectionEvent, ConnectionMessenger, FLAG_CONNECTED};
use crate::messenger::gap::{DiscoverMode, GapEvent, GapMessenger};
use crate::messenger::system::SystemMessenger;
use crate::transport::Transport;
use crate::{HostError, Result};

/// Single-packet attribute payload limit; larger writes must be chunked
/// by the caller.
pub const WRITE_LIMIT: usize = 20;

// ----------------------------------------------------------------------------
// Domain Objects
// ----------------------------------------------------------------------------

/// A connected remote device.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Peripheral {
    pub connection: ConnectionHandle,
    pub address: BdAddr,
    pub address_type: AddressType,
}

/// A primary GATT service on a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GattService {
    pub connection: ConnectionHandle,
    pub start_handle: u16,
    pub end_handle: u16,
    pub uuid: BleUuid,
}

/// A GATT characteristic inside a service.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Characteristic {
    pub connection: ConnectionHandle,
    /// Handle of the declaration attribute.
    pub start_handle: u16,
    /// Last handle belonging to this characteristic, descriptors included.
    pub end_handle: u16,
    /// Handle the value is read from and written to.
    pub value_handle: u16,
    pub uuid: BleUuid,
    pub properties: CharacteristicProperties,
}

/// A device heard while scanning.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DiscoveredDevice {
    pub address: BdAddr,
    pub address_type: Option<AddressType>,
    /// Most recent RSSI, in dBm.
    pub rssi: i8,
    pub packet_type: u8,
    pub bond: Option<u8>,
    /// Merged advertisement and scan-response fields.
    pub advertisement: Advertisement,
}

/// Acknowledgement mode for [`Central::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

/// Value for the client characteristic configuration descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientConfiguration(pub u16);

impl ClientConfiguration {
    pub const DISABLED: Self = Self(0x0000);
    pub const NOTIFY: Self = Self(0x0001);
    pub const INDICATE: Self = Self(0x0002);
}

/// Notification raised when a link drops for any non-local reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionLost {
    pub peripheral: Peripheral,
    pub reason: ErrorCode,
}

#[derive(Debug, Default)]
struct PeripheralState {
    info: Option<Peripheral>,
    services: HashMap<u16, GattService>,
    characteristics: HashMap<u16, Characteristic>,
}

// ----------------------------------------------------------------------------
// Central
// ----------------------------------------------------------------------------

/// The central-role engine over one radio module.
pub struct Central {
    dispatcher: Dispatcher,
    config: HostConfig,
    system: SystemMessenger,
    connection: ConnectionMessenger,
    attclient: AttClientMessenger,
    gap: GapMessenger,
    peripherals: Arc<RwLock<HashMap<ConnectionHandle, PeripheralState>>>,
    lost_tx: broadcast::Sender<ConnectionLost>,
    monitor: JoinHandle<()>,
}

impl Central {
    /// Start a client over a transport and spawn its dispatch and
    /// monitor tasks.
    pub fn new<T: Transport>(transport: T, config: HostConfig) -> Self {
        let dispatcher = Dispatcher::spawn(transport, config.clone());
        Self::with_dispatcher(dispatcher, config)
    }

    /// Build on an already-running dispatcher.
    pub fn with_dispatcher(dispatcher: Dispatcher, config: HostConfig) -> Self {
        let peripherals: Arc<RwLock<HashMap<ConnectionHandle, PeripheralState>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let (lost_tx, _) = broadcast::channel(config.event_channel_capacity);

        let monitor = tokio::spawn(monitor_loop(
            dispatcher.events().subscribe_connection(),
            Arc::clone(&peripherals),
            lost_tx.clone(),
        ));

        Self {
            system: SystemMessenger::new(dispatcher.clone()),
            connection: ConnectionMessenger::new(dispatcher.clone()),
            attclient: AttClientMessenger::new(dispatcher.clone()),
            gap: GapMessenger::new(dispatcher.clone()),
            dispatcher,
            config,
            peripherals,
            lost_tx,
            monitor,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn system(&self) -> &SystemMessenger {
        &self.system
    }

    pub fn gap(&self) -> &GapMessenger {
        &self.gap
    }

    pub fn connection(&self) -> &ConnectionMessenger {
        &self.connection
    }

    pub fn attclient(&self) -> &AttClientMessenger {
        &self.attclient
    }

    /// Subscribe to connection-lost notifications. Locally initiated
    /// disconnects never appear here.
    pub fn connection_lost(&self) -> broadcast::Receiver<ConnectionLost> {
        self.lost_tx.subscribe()
    }

    /// Snapshot of a connected peripheral, if any.
    pub async fn peripheral(&self, connection: ConnectionHandle) -> Option<Peripheral> {
        self.peripherals
            .read()
            .await
            .get(&connection)
            .and_then(|state| state.info.clone())
    }

    // ------------------------------------------------------------------
    // Connect / Disconnect
    // ------------------------------------------------------------------

    /// Connect to a device by address.
    ///
    /// The command response only acknowledges that the attempt started;
    /// the real handle arrives in a `status` event which must be matched
    /// by address, since several attempts can be pending at once.
    pub async fn connect(&self, address: BdAddr, address_type: AddressType) -> Result<Peripheral> {
        let mut events = self.connection.subscribe();
        let (interval_min, interval_max) = self.config.conn_interval;
        self.gap
            .connect_direct(
                address,
                address_type,
                interval_min,
                interval_max,
                self.config.supervision_timeout,
                self.config.latency,
            )
            .await?;

        let wait = self.config.connect_timeout;
        let established = tokio::time::timeout(wait, async {
            loop {
                match events.recv().await {
                    Ok(ConnectionEvent::Status {
                        connection,
                        flags,
                        address: evt_address,
                        address_type: evt_address_type,
                        ..
                    }) if evt_address == address
                        && evt_address_type == Some(address_type)
                        && flags & FLAG_CONNECTED != 0 =>
                    {
                        return Ok(connection);
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        return Err(HostError::EventStreamLagged { missed });
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(HostError::TransportClosed);
                    }
                }
            }
        })
        .await;

        let connection = match established {
            Ok(result) => result?,
            Err(_) => {
                // Abort the pending attempt so the module is usable again.
                if let Err(err) = self.gap.end_procedure().await {
                    tracing::debug!(%err, "end_procedure after connect timeout failed");
                }
                return Err(HostError::Timeout {
                    operation: "connect",
                    after_ms: wait.as_millis() as u64,
                });
            }
        };

        let peripheral = Peripheral { connection, address, address_type };
        let mut map = self.peripherals.write().await;
        let state = map.entry(connection).or_default();
        state.info = Some(peripheral.clone());
        tracing::info!(connection, %address, "connected");
        Ok(peripheral)
    }

    /// Tear down a connection and wait for the link to drop.
    pub async fn disconnect(&self, peripheral: &Peripheral) -> Result<()> {
        let connection = peripheral.connection;
        let mut events = self.connection.subscribe();
        self.connection.disconnect(connection).await?;

        let wait = self.config.procedure_timeout;
        tokio::time::timeout(wait, async {
            loop {
                match events.recv().await {
                    Ok(ConnectionEvent::Disconnected { connection: c, .. }) if c == connection => {
                        return Ok(());
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        return Err(HostError::EventStreamLagged { missed });
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(HostError::TransportClosed);
                    }
                }
            }
        })
        .await
        .map_err(|_| HostError::Timeout {
            operation: "disconnect",
            after_ms: wait.as_millis() as u64,
        })??;

        // The monitor evicts too; doing it here as well makes the entry
        // gone by the time this call returns.
        self.peripherals.write().await.remove(&connection);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Enumerate the peripheral's primary services.
    ///
    /// Records are returned in arrival order; callers that need them
    /// sorted by handle sort them themselves.
    pub async fn discover_services(&self, peripheral: &Peripheral) -> Result<Vec<GattService>> {
        let connection = peripheral.connection;
        let mut watch = self.watch(connection);
        self.attclient
            .read_by_group_type(connection, 0x0001, 0xffff, BleUuid::Short(ble_uuid::PRIMARY_SERVICE))
            .await?;

        let mut services = Vec::new();
        watch
            .run(self.config.procedure_timeout, "discover services", |event| {
                match event {
                    AttClientEvent::GroupFound { connection: c, start, end, uuid } if c == connection => {
                        services.push(GattService { connection, start_handle: start, end_handle: end, uuid });
                        Ok(None)
                    }
                    AttClientEvent::ProcedureCompleted { connection: c, result, .. } if c == connection => {
                        HostError::check_result(result.0)?;
                        Ok(Some(()))
                    }
                    _ => Ok(None),
                }
            })
            .await?;

        let mut map = self.peripherals.write().await;
        let state = map.entry(connection).or_default();
        state.services = services.iter().map(|s| (s.start_handle, s.clone())).collect();
        tracing::debug!(connection, count = services.len(), "service discovery complete");
        Ok(services)
    }

    /// Enumerate the characteristics declared inside a service.
    pub async fn discover_characteristics(&self, service: &GattService) -> Result<Vec<Characteristic>> {
        let connection = service.connection;
        let mut watch = self.watch(connection);
        self.attclient
            .read_by_type(
                connection,
                service.start_handle,
                service.end_handle,
                BleUuid::Short(ble_uuid::CHARACTERISTIC_DECLARATION),
            )
            .await?;

        let mut declarations: Vec<(u16, Vec<u8>)> = Vec::new();
        watch
            .run(self.config.procedure_timeout, "discover characteristics", |event| {
                match event {
                    AttClientEvent::AttributeValue {
                        connection: c,
                        handle,
                        kind: AttributeValueKind::ReadByType,
                        value,
                    } if c == connection => {
                        declarations.push((handle, value));
                        Ok(None)
                    }
                    AttClientEvent::ProcedureCompleted { connection: c, result, .. } if c == connection => {
                        HostError::check_result(result.0)?;
                        Ok(Some(()))
                    }
                    _ => Ok(None),
                }
            })
            .await?;

        let characteristics = decode_declarations(connection, service.end_handle, &declarations)?;

        let mut map = self.peripherals.write().await;
        let state = map.entry(connection).or_default();
        for c in &characteristics {
            state.characteristics.insert(c.value_handle, c.clone());
        }
        tracing::debug!(connection, count = characteristics.len(), "characteristic discovery complete");
        Ok(characteristics)
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    /// Write the client configuration descriptor of a characteristic,
    /// enabling or disabling notifications/indications.
    ///
    /// Walks the characteristic's handle range with find-information to
    /// locate the descriptor first; fails with
    /// [`HostError::NoConfigurationDescriptor`] when there is none.
    pub async fn configure_notifications(
        &self,
        characteristic: &Characteristic,
        configuration: ClientConfiguration,
    ) -> Result<()> {
        let connection = characteristic.connection;
        let mut watch = self.watch(connection);
        self.attclient
            .find_information(connection, characteristic.start_handle, characteristic.end_handle)
            .await?;

        let mut descriptor = None;
        watch
            .run(self.config.procedure_timeout, "configure notifications", |event| {
                match event {
                    AttClientEvent::FindInformationFound { connection: c, handle, uuid } if c == connection => {
                        if uuid == BleUuid::Short(ble_uuid::CLIENT_CHARACTERISTIC_CONFIGURATION) {
                            descriptor.get_or_insert(handle);
                        }
                        Ok(None)
                    }
                    AttClientEvent::ProcedureCompleted { connection: c, result, .. } if c == connection => {
                        HostError::check_result(result.0)?;
                        Ok(Some(()))
                    }
                    _ => Ok(None),
                }
            })
            .await?;

        let handle = descriptor.ok_or(HostError::NoConfigurationDescriptor)?;
        self.attclient
            .write_command(connection, handle, &configuration.0.to_le_bytes())
            .await?;
        tracing::debug!(connection, handle, value = configuration.0, "client configuration written");
        Ok(())
    }

    /// Stream of value updates for a characteristic with notifications
    /// or indications enabled. Indications are confirmed automatically.
    /// Dropping the receiver ends the stream.
    pub fn notifications(&self, characteristic: &Characteristic) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(self.config.event_channel_capacity);
        let mut events = self.attclient.subscribe();
        let attclient = self.attclient.clone();
        let connection = characteristic.connection;
        let value_handle = characteristic.value_handle;

        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "notification stream lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let AttClientEvent::AttributeValue { connection: c, handle, kind, value } = event else {
                    continue;
                };
                if c != connection || handle != value_handle {
                    continue;
                }
                match kind {
                    AttributeValueKind::Notify => {}
                    AttributeValueKind::Indicate | AttributeValueKind::IndicateRequiresConfirm => {
                        if let Err(err) = attclient.indicate_confirm(connection).await {
                            tracing::warn!(%err, "indicate confirm failed");
                        }
                    }
                    _ => continue,
                }
                if tx.send(value).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    // ------------------------------------------------------------------
    // Read / Write
    // ------------------------------------------------------------------

    /// Read a characteristic value (single packet).
    pub async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>> {
        let connection = characteristic.connection;
        let value_handle = characteristic.value_handle;
        let mut watch = self.watch(connection);
        self.attclient.read_by_handle(connection, value_handle).await?;

        watch
            .run(self.config.procedure_timeout, "read", |event| match event {
                AttClientEvent::AttributeValue {
                    connection: c,
                    handle,
                    kind: AttributeValueKind::Read,
                    value,
                } if c == connection && handle == value_handle => Ok(Some(value)),
                // A failed read completes with an error instead of a value.
                AttClientEvent::ProcedureCompleted { connection: c, result, chr_handle }
                    if c == connection && chr_handle == value_handle =>
                {
                    HostError::check_result(result.0)?;
                    Ok(None)
                }
                _ => Ok(None),
            })
            .await
    }

    /// Read a value longer than a single packet, blob by blob.
    pub async fn read_long(&self, characteristic: &Characteristic) -> Result<Vec<u8>> {
        let connection = characteristic.connection;
        let value_handle = characteristic.value_handle;
        let mut watch = self.watch(connection);
        self.attclient.read_long(connection, value_handle).await?;

        let mut buffer = Vec::new();
        watch
            .run(self.config.procedure_timeout, "read long", |event| match event {
                AttClientEvent::AttributeValue {
                    connection: c,
                    handle,
                    kind: AttributeValueKind::ReadBlob,
                    value,
                } if c == connection && handle == value_handle => {
                    buffer.extend_from_slice(&value);
                    Ok(None)
                }
                AttClientEvent::ProcedureCompleted { connection: c, result, .. } if c == connection => {
                    HostError::check_result(result.0)?;
                    Ok(Some(()))
                }
                _ => Ok(None),
            })
            .await?;
        Ok(buffer)
    }

    /// Write a characteristic value.
    ///
    /// Payloads over [`WRITE_LIMIT`] bytes are rejected; chunking into
    /// successive writes is the caller's responsibility, as is
    /// serializing writes to the same characteristic.
    pub async fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<()> {
        if data.len() > WRITE_LIMIT {
            return Err(HostError::PayloadTooLarge { len: data.len(), max: WRITE_LIMIT });
        }
        let connection = characteristic.connection;
        let value_handle = characteristic.value_handle;

        match mode {
            WriteMode::WithoutResponse => {
                self.attclient.write_command(connection, value_handle, data).await
            }
            WriteMode::WithResponse => {
                let mut watch = self.watch(connection);
                self.attclient.attribute_write(connection, value_handle, data).await?;
                watch
                    .run(self.config.procedure_timeout, "write", |event| match event {
                        AttClientEvent::ProcedureCompleted { connection: c, result, chr_handle }
                            if c == connection && chr_handle == value_handle =>
                        {
                            HostError::check_result(result.0)?;
                            Ok(Some(()))
                        }
                        _ => Ok(None),
                    })
                    .await
            }
        }
    }

    // ------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------

    /// Scan for advertising devices for a fixed duration.
    ///
    /// Reports are deduplicated by address; repeated sightings update
    /// the RSSI and merge advertisement fields (scan responses complete
    /// the picture the advertisement packet started).
    pub async fn scan(&self, mode: DiscoverMode, duration: Duration) -> Result<Vec<DiscoveredDevice>> {
        let mut events = self.gap.subscribe();
        self.gap.discover(mode).await?;

        let mut found: HashMap<BdAddr, DiscoveredDevice> = HashMap::new();
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                event = events.recv() => match event {
                    Ok(GapEvent::ScanResponse { rssi, packet_type, sender, address_type, bond, data }) => {
                        let advertisement = Advertisement::parse(&data);
                        let entry = found.entry(sender).or_insert_with(|| DiscoveredDevice {
                            address: sender,
                            address_type,
                            rssi,
                            packet_type,
                            bond,
                            advertisement: Advertisement::default(),
                        });
                        entry.rssi = rssi;
                        if entry.advertisement.name.is_none() {
                            entry.advertisement.name = advertisement.name;
                        }
                        for (ad_type, field) in advertisement.fields {
                            entry.advertisement.fields.entry(ad_type).or_insert(field);
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "scan stream lagged, some reports were dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(HostError::TransportClosed);
                    }
                },
            }
        }
        self.gap.end_procedure().await?;
        Ok(found.into_values().collect())
    }

    fn watch(&self, connection: ConnectionHandle) -> ProcedureWatch {
        ProcedureWatch {
            connection,
            attclient: self.attclient.subscribe(),
            connections: self.connection.subscribe(),
        }
    }
}

impl Drop for Central {
    fn drop(&mut self) {
        self.monitor.abort();
    }
}

// ----------------------------------------------------------------------------
// Procedure Watch
// ----------------------------------------------------------------------------

/// Event windows for one accumulating procedure.
///
/// Subscribed *before* the command is issued so no event can slip
/// between the response and the first accumulation.
struct ProcedureWatch {
    connection: ConnectionHandle,
    attclient: broadcast::Receiver<AttClientEvent>,
    connections: broadcast::Receiver<ConnectionEvent>,
}

impl ProcedureWatch {
    /// Drive `handler` with attribute-client events until it yields a
    /// result, the connection drops, or the deadline passes.
    async fn run<R>(
        &mut self,
        wait: Duration,
        operation: &'static str,
        mut handler: impl FnMut(AttClientEvent) -> Result<Option<R>>,
    ) -> Result<R> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(HostError::Timeout { operation, after_ms: wait.as_millis() as u64 });
                }
                event = self.attclient.recv() => match event {
                    Ok(event) => {
                        if let Some(result) = handler(event)? {
                            return Ok(result);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        return Err(HostError::EventStreamLagged { missed });
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(HostError::TransportClosed);
                    }
                },
                event = self.connections.recv() => match event {
                    Ok(ConnectionEvent::Disconnected { connection, .. })
                        if connection == self.connection =>
                    {
                        return Err(HostError::ConnectionLost { connection });
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        return Err(HostError::EventStreamLagged { missed });
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(HostError::TransportClosed);
                    }
                },
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Monitor Task
// ----------------------------------------------------------------------------

/// Evicts peripherals when their link drops and raises connection-lost
/// notifications for every non-local reason.
async fn monitor_loop(
    mut events: broadcast::Receiver<ConnectionEvent>,
    peripherals: Arc<RwLock<HashMap<ConnectionHandle, PeripheralState>>>,
    lost_tx: broadcast::Sender<ConnectionLost>,
) {
    loop {
        match events.recv().await {
            Ok(ConnectionEvent::Disconnected { connection, reason }) => {
                let removed = peripherals.write().await.remove(&connection);
                let Some(PeripheralState { info: Some(peripheral), .. }) = removed else {
                    continue;
                };
                if reason == ErrorCode::LOCAL_TERMINATION {
                    tracing::debug!(connection, "locally initiated disconnect");
                } else {
                    tracing::info!(connection, %reason, "connection lost");
                    let _ = lost_tx.send(ConnectionLost { peripheral, reason });
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "connection monitor lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

// ----------------------------------------------------------------------------
// Declaration Decoding
// ----------------------------------------------------------------------------

/// Decode characteristic declarations and derive each end handle from
/// the next declaration's start handle (service end for the last one).
/// Records are taken in arrival order, which the protocol sends
/// ascending by handle.
fn decode_declarations(
    connection: ConnectionHandle,
    service_end: u16,
    declarations: &[(u16, Vec<u8>)],
) -> Result<Vec<Characteristic>> {
    let mut characteristics = Vec::with_capacity(declarations.len());
    for (start_handle, value) in declarations {
        let mut r = PayloadReader::new(value);
        let properties = CharacteristicProperties::from_byte(r.u8()?);
        let value_handle = r.u16_le()?;
        let uuid = BleUuid::from_wire(r.rest()).map_err(HostError::Decode)?;
        characteristics.push(Characteristic {
            connection,
            start_handle: *start_handle,
            end_handle: service_end,
            value_handle,
            uuid,
            properties,
        });
    }
    for i in 0..characteristics.len() {
        let end = characteristics
            .get(i + 1)
            .map(|next| next.start_handle.saturating_sub(1))
            .unwrap_or(service_end);
        characteristics[i].end_handle = end;
    }
    Ok(characteristics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declaration(properties: u8, value_handle: u16, uuid: u16) -> Vec<u8> {
        let mut v = vec![properties];
        v.extend_from_slice(&value_handle.to_le_bytes());
        v.extend_from_slice(&uuid.to_le_bytes());
        v
    }

    #[test]
    fn end_handles_derive_from_the_next_declaration() {
        let declarations = vec![
            (0x0002, declaration(0x02, 0x0003, 0x2a00)),
            (0x0005, declaration(0x12, 0x0006, 0x2a01)),
            (0x0009, declaration(0x08, 0x000a, 0x2a02)),
        ];
        let chars = decode_declarations(3, 0x000f, &declarations).unwrap();

        assert_eq!(chars.len(), 3);
        assert_eq!(chars[0].end_handle, 0x0004);
        assert_eq!(chars[1].end_handle, 0x0008);
        assert_eq!(chars[2].end_handle, 0x000f);
        assert_eq!(chars[1].value_handle, 0x0006);
        assert!(chars[1].properties.can_notify());
        assert_eq!(chars[2].uuid, BleUuid::Short(0x2a02));
    }

    #[test]
    fn sixteen_byte_uuid_declarations_decode() {
        let mut value = vec![0x08, 0x0b, 0x00];
        value.extend_from_slice(&[0u8; 16]);
        let chars = decode_declarations(1, 0x0010, &[(0x000a, value)]).unwrap();
        assert!(matches!(chars[0].uuid, BleUuid::Full(_)));
    }

    #[test]
    fn zero_start_handle_does_not_underflow_the_previous_end() {
        // Handle 0 is invalid at the ATT level but a misbehaving module
        // can still send it; the derivation must not wrap.
        let declarations = vec![
            (0x0005, declaration(0x02, 0x0006, 0x2a00)),
            (0x0000, declaration(0x02, 0x0001, 0x2a01)),
        ];
        let chars = decode_declarations(1, 0x000f, &declarations).unwrap();
        assert_eq!(chars[0].end_handle, 0x0000);
        assert_eq!(chars[1].end_handle, 0x000f);
    }

    #[test]
    fn truncated_declaration_fails_typed() {
        let declarations = vec![(0x0002, vec![0x02, 0x03])];
        assert!(decode_declarations(1, 0x000f, &declarations).is_err());
    }
}
