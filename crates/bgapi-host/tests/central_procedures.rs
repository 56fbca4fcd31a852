//! Discovery-engine integration tests
//!
//! Full scripted scenarios over an in-memory transport: connect and
//! service discovery, characteristic decoding, notification
//! configuration, reads and writes, and disconnect cleanup.

mod common;

use std::time::Duration;

use bgapi_core::ble_uuid::BleUuid;
use bgapi_core::error_code::ErrorCode;
use bgapi_core::frame::MessageClass;
use bgapi_core::types::{AddressType, BdAddr, CharacteristicProperties};
use bgapi_host::central::{Characteristic, ClientConfiguration, WriteMode};
use bgapi_host::messenger::DiscoverMode;
use bgapi_host::{Central, HostConfig, HostError, Peripheral};
use common::*;

const CONN: u8 = 3;

fn test_central() -> (Central, ScriptedModule) {
    let (transport, module) = ScriptedModule::attach();
    let config = HostConfig::default()
        .with_connect_timeout(Duration::from_secs(2))
        .with_procedure_timeout(Duration::from_secs(2));
    (Central::new(transport, config), module)
}

fn device_address() -> BdAddr {
    "AA:BB:CC:DD:EE:FF".parse().unwrap()
}

/// Scripted connect: direct-connect command, then the address-matched
/// status event carrying the real handle.
async fn scripted_connect(central: &Central, module: &mut ScriptedModule) -> Peripheral {
    let address = device_address();
    let connect = central.connect(address, AddressType::Public);
    let script = async {
        let command = module.expect_command().await;
        assert_eq!(command.key(), (0x06, 0x03));
        module
            .respond(MessageClass::Gap, 0x03, connect_direct_response(0, CONN))
            .await;
        module
            .send_event(MessageClass::Connection, 0x00, status_event(CONN, address, AddressType::Public))
            .await;
    };
    let (peripheral, _) = tokio::join!(connect, script);
    peripheral.expect("scripted connect failed")
}

fn test_characteristic() -> Characteristic {
    Characteristic {
        connection: CONN,
        start_handle: 0x0010,
        end_handle: 0x0013,
        value_handle: 0x0011,
        uuid: BleUuid::Short(0x2a06),
        properties: CharacteristicProperties::from_byte(0x1a),
    }
}

// ----------------------------------------------------------------------------
// Connect + Discover
// ----------------------------------------------------------------------------

#[tokio::test]
async fn connect_then_discover_services() {
    let (central, mut module) = test_central();
    let peripheral = scripted_connect(&central, &mut module).await;
    assert_eq!(peripheral.connection, CONN);
    assert_eq!(peripheral.address, device_address());

    let discover = central.discover_services(&peripheral);
    let script = async {
        let command = module.expect_command().await;
        assert_eq!(command.key(), (0x04, 0x01));
        module.respond(MessageClass::AttributeClient, 0x01, result_response(CONN, 0)).await;
        module
            .send_event(MessageClass::AttributeClient, 0x02, group_found_event(CONN, 1, 5, 0x1800))
            .await;
        module
            .send_event(MessageClass::AttributeClient, 0x01, procedure_completed_event(CONN, 0, 0))
            .await;
    };

    let (services, _) = tokio::join!(discover, script);
    let services = services.unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].start_handle, 1);
    assert_eq!(services[0].end_handle, 5);
    assert_eq!(services[0].uuid, BleUuid::Short(0x1800));
}

#[tokio::test]
async fn completion_for_another_connection_does_not_terminate() {
    let (central, mut module) = test_central();
    let peripheral = scripted_connect(&central, &mut module).await;

    let discover = central.discover_services(&peripheral);
    let script = async {
        module.expect_command().await;
        module.respond(MessageClass::AttributeClient, 0x01, result_response(CONN, 0)).await;
        module
            .send_event(MessageClass::AttributeClient, 0x02, group_found_event(CONN, 1, 5, 0x1800))
            .await;
        // Noise for a different connection: neither the record nor the
        // completion may affect handle 3's procedure.
        module
            .send_event(MessageClass::AttributeClient, 0x01, procedure_completed_event(7, 0, 0))
            .await;
        module
            .send_event(MessageClass::AttributeClient, 0x02, group_found_event(7, 1, 9, 0x1801))
            .await;
        module
            .send_event(MessageClass::AttributeClient, 0x02, group_found_event(CONN, 6, 9, 0x180f))
            .await;
        module
            .send_event(MessageClass::AttributeClient, 0x01, procedure_completed_event(CONN, 0, 0))
            .await;
    };

    let (services, _) = tokio::join!(discover, script);
    let services = services.unwrap();
    assert_eq!(services.len(), 2);
    assert!(services.iter().all(|s| s.connection == CONN));
}

#[tokio::test]
async fn discover_characteristics_derives_end_handles() {
    let (central, mut module) = test_central();
    let peripheral = scripted_connect(&central, &mut module).await;

    let service = bgapi_host::GattService {
        connection: peripheral.connection,
        start_handle: 0x0001,
        end_handle: 0x000f,
        uuid: BleUuid::Short(0x1800),
    };

    let discover = central.discover_characteristics(&service);
    let script = async {
        let command = module.expect_command().await;
        assert_eq!(command.key(), (0x04, 0x02));
        module.respond(MessageClass::AttributeClient, 0x02, result_response(CONN, 0)).await;
        module
            .send_event(
                MessageClass::AttributeClient,
                0x05,
                attribute_value_event(CONN, 0x0002, 0x03, &declaration_record(0x02, 0x0003, 0x2a00)),
            )
            .await;
        module
            .send_event(
                MessageClass::AttributeClient,
                0x05,
                attribute_value_event(CONN, 0x0005, 0x03, &declaration_record(0x12, 0x0006, 0x2a01)),
            )
            .await;
        module
            .send_event(MessageClass::AttributeClient, 0x01, procedure_completed_event(CONN, 0, 0))
            .await;
    };

    let (characteristics, _) = tokio::join!(discover, script);
    let characteristics = characteristics.unwrap();
    assert_eq!(characteristics.len(), 2);
    assert_eq!(characteristics[0].end_handle, 0x0004);
    assert_eq!(characteristics[1].end_handle, 0x000f);
    assert_eq!(characteristics[1].value_handle, 0x0006);
    assert!(characteristics[1].properties.can_notify());
}

// ----------------------------------------------------------------------------
// Notifications
// ----------------------------------------------------------------------------

#[tokio::test]
async fn configure_notifications_writes_the_cccd() {
    let (central, mut module) = test_central();
    let _peripheral = scripted_connect(&central, &mut module).await;
    let characteristic = test_characteristic();

    let configure = central.configure_notifications(&characteristic, ClientConfiguration::NOTIFY);
    let script = async {
        let command = module.expect_command().await;
        assert_eq!(command.key(), (0x04, 0x03));
        module.respond(MessageClass::AttributeClient, 0x03, result_response(CONN, 0)).await;
        module
            .send_event(MessageClass::AttributeClient, 0x04, find_information_found_event(CONN, 0x0011, 0x2a06))
            .await;
        module
            .send_event(MessageClass::AttributeClient, 0x04, find_information_found_event(CONN, 0x0012, 0x2902))
            .await;
        module
            .send_event(MessageClass::AttributeClient, 0x01, procedure_completed_event(CONN, 0, 0))
            .await;

        // The descriptor write rides the no-response primitive.
        let command = module.expect_command().await;
        assert_eq!(command.key(), (0x04, 0x06));
        assert_eq!(command.payload.as_slice(), &[CONN, 0x12, 0x00, 0x02, 0x01, 0x00]);
    };

    let (result, _) = tokio::join!(configure, script);
    result.unwrap();
}

#[tokio::test]
async fn missing_cccd_is_a_typed_error() {
    let (central, mut module) = test_central();
    let _peripheral = scripted_connect(&central, &mut module).await;
    let characteristic = test_characteristic();

    let configure = central.configure_notifications(&characteristic, ClientConfiguration::INDICATE);
    let script = async {
        module.expect_command().await;
        module.respond(MessageClass::AttributeClient, 0x03, result_response(CONN, 0)).await;
        module
            .send_event(MessageClass::AttributeClient, 0x04, find_information_found_event(CONN, 0x0011, 0x2a06))
            .await;
        module
            .send_event(MessageClass::AttributeClient, 0x01, procedure_completed_event(CONN, 0, 0))
            .await;
    };

    let (result, _) = tokio::join!(configure, script);
    assert!(matches!(result, Err(HostError::NoConfigurationDescriptor)));
}

#[tokio::test]
async fn notification_stream_yields_value_updates() {
    let (central, mut module) = test_central();
    let _peripheral = scripted_connect(&central, &mut module).await;
    let characteristic = test_characteristic();

    let mut values = central.notifications(&characteristic);
    module
        .send_event(MessageClass::AttributeClient, 0x05, attribute_value_event(CONN, 0x0011, 0x01, &[0x2a]))
        .await;
    // A different handle must not leak into this stream.
    module
        .send_event(MessageClass::AttributeClient, 0x05, attribute_value_event(CONN, 0x0042, 0x01, &[0xff]))
        .await;
    module
        .send_event(MessageClass::AttributeClient, 0x05, attribute_value_event(CONN, 0x0011, 0x01, &[0x2b]))
        .await;

    assert_eq!(values.recv().await.unwrap(), vec![0x2a]);
    assert_eq!(values.recv().await.unwrap(), vec![0x2b]);
}

#[tokio::test]
async fn indication_is_confirmed_and_yielded() {
    let (central, mut module) = test_central();
    let _peripheral = scripted_connect(&central, &mut module).await;
    let characteristic = test_characteristic();

    let mut values = central.notifications(&characteristic);
    module
        .send_event(MessageClass::AttributeClient, 0x05, attribute_value_event(CONN, 0x0011, 0x02, &[0x99]))
        .await;

    // The stream task acknowledges the indication before yielding.
    let command = module.expect_command().await;
    assert_eq!(command.key(), (0x04, 0x07));
    assert_eq!(command.payload.as_slice(), &[CONN]);
    module.respond(MessageClass::AttributeClient, 0x07, vec![0x00, 0x00]).await;

    assert_eq!(values.recv().await.unwrap(), vec![0x99]);
}

// ----------------------------------------------------------------------------
// Read / Write
// ----------------------------------------------------------------------------

#[tokio::test]
async fn read_returns_the_matching_value() {
    let (central, mut module) = test_central();
    let _peripheral = scripted_connect(&central, &mut module).await;
    let characteristic = test_characteristic();

    let read = central.read(&characteristic);
    let script = async {
        let command = module.expect_command().await;
        assert_eq!(command.key(), (0x04, 0x04));
        assert_eq!(command.payload.as_slice(), &[CONN, 0x11, 0x00]);
        module.respond(MessageClass::AttributeClient, 0x04, result_response(CONN, 0)).await;
        // A value for another handle first, then the right one.
        module
            .send_event(MessageClass::AttributeClient, 0x05, attribute_value_event(CONN, 0x0042, 0x00, &[0xff]))
            .await;
        module
            .send_event(MessageClass::AttributeClient, 0x05, attribute_value_event(CONN, 0x0011, 0x00, &[0x12, 0x34]))
            .await;
    };

    let (value, _) = tokio::join!(read, script);
    assert_eq!(value.unwrap(), vec![0x12, 0x34]);
}

#[tokio::test]
async fn read_long_accumulates_blobs_in_order() {
    let (central, mut module) = test_central();
    let _peripheral = scripted_connect(&central, &mut module).await;
    let characteristic = test_characteristic();

    let read = central.read_long(&characteristic);
    let script = async {
        let command = module.expect_command().await;
        assert_eq!(command.key(), (0x04, 0x08));
        assert_eq!(command.payload.as_slice(), &[CONN, 0x11, 0x00]);
        module.respond(MessageClass::AttributeClient, 0x08, result_response(CONN, 0)).await;
        module
            .send_event(MessageClass::AttributeClient, 0x05, attribute_value_event(CONN, 0x0011, 0x04, &[0x01, 0x02]))
            .await;
        // A blob for another handle must not be stitched in.
        module
            .send_event(MessageClass::AttributeClient, 0x05, attribute_value_event(CONN, 0x0042, 0x04, &[0xff]))
            .await;
        module
            .send_event(MessageClass::AttributeClient, 0x05, attribute_value_event(CONN, 0x0011, 0x04, &[0x03]))
            .await;
        module
            .send_event(MessageClass::AttributeClient, 0x01, procedure_completed_event(CONN, 0, 0x0011))
            .await;
    };

    let (value, _) = tokio::join!(read, script);
    assert_eq!(value.unwrap(), vec![0x01, 0x02, 0x03]);
}

#[tokio::test]
async fn failed_read_surfaces_the_completion_error() {
    let (central, mut module) = test_central();
    let _peripheral = scripted_connect(&central, &mut module).await;
    let characteristic = test_characteristic();

    let read = central.read(&characteristic);
    let script = async {
        module.expect_command().await;
        module.respond(MessageClass::AttributeClient, 0x04, result_response(CONN, 0)).await;
        module
            .send_event(MessageClass::AttributeClient, 0x01, procedure_completed_event(CONN, 0x0402, 0x0011))
            .await;
    };

    let (result, _) = tokio::join!(read, script);
    assert!(matches!(result, Err(HostError::Protocol(ErrorCode(0x0402)))));
}

#[tokio::test]
async fn write_with_response_error_surfaces_the_vendor_message() {
    let (central, mut module) = test_central();
    let _peripheral = scripted_connect(&central, &mut module).await;
    let characteristic = test_characteristic();

    let write = central.write(&characteristic, &[0x01], WriteMode::WithResponse);
    let script = async {
        let command = module.expect_command().await;
        assert_eq!(command.key(), (0x04, 0x05));
        module.respond(MessageClass::AttributeClient, 0x05, result_response(CONN, 0)).await;
        module
            .send_event(MessageClass::AttributeClient, 0x01, procedure_completed_event(CONN, 0x0401, 0x0011))
            .await;
    };

    let (result, _) = tokio::join!(write, script);
    let err = result.unwrap_err();
    assert!(matches!(err, HostError::Protocol(ErrorCode(0x0401))));
    assert!(err
        .to_string()
        .contains("The attribute handle given was not valid on this server."));
}

#[tokio::test]
async fn oversize_write_is_rejected_before_the_wire() {
    let (central, mut module) = test_central();
    let _peripheral = scripted_connect(&central, &mut module).await;
    let characteristic = test_characteristic();

    let result = central.write(&characteristic, &[0u8; 21], WriteMode::WithoutResponse).await;
    assert!(matches!(result, Err(HostError::PayloadTooLarge { len: 21, max: 20 })));
    module.assert_idle();
}

// ----------------------------------------------------------------------------
// Disconnect Cleanup
// ----------------------------------------------------------------------------

#[tokio::test]
async fn remote_disconnect_evicts_and_notifies_exactly_once() {
    let (central, mut module) = test_central();
    let peripheral = scripted_connect(&central, &mut module).await;
    let mut lost = central.connection_lost();

    // Link supervision timeout.
    module
        .send_event(MessageClass::Connection, 0x04, disconnected_event(CONN, 0x0208))
        .await;

    let notification = lost.recv().await.unwrap();
    assert_eq!(notification.peripheral, peripheral);
    assert_eq!(notification.reason, ErrorCode(0x0208));
    assert!(central.peripheral(CONN).await.is_none());
    assert!(lost.try_recv().is_err());
}

#[tokio::test]
async fn local_disconnect_raises_no_connection_lost() {
    let (central, mut module) = test_central();
    let peripheral = scripted_connect(&central, &mut module).await;
    let mut lost = central.connection_lost();

    let disconnect = central.disconnect(&peripheral);
    let script = async {
        let command = module.expect_command().await;
        assert_eq!(command.key(), (0x03, 0x00));
        module.respond(MessageClass::Connection, 0x00, result_response(CONN, 0)).await;
        module
            .send_event(MessageClass::Connection, 0x04, disconnected_event(CONN, 0x0216))
            .await;
    };

    let (result, _) = tokio::join!(disconnect, script);
    result.unwrap();
    assert!(central.peripheral(CONN).await.is_none());

    let quiet = tokio::time::timeout(Duration::from_millis(100), lost.recv()).await;
    assert!(quiet.is_err(), "local termination must not notify");
}

#[tokio::test]
async fn in_flight_discovery_is_canceled_by_disconnect() {
    let (central, mut module) = test_central();
    let peripheral = scripted_connect(&central, &mut module).await;

    let discover = central.discover_services(&peripheral);
    let script = async {
        module.expect_command().await;
        module.respond(MessageClass::AttributeClient, 0x01, result_response(CONN, 0)).await;
        module
            .send_event(MessageClass::AttributeClient, 0x02, group_found_event(CONN, 1, 5, 0x1800))
            .await;
        // The link drops before the procedure completes.
        module
            .send_event(MessageClass::Connection, 0x04, disconnected_event(CONN, 0x0208))
            .await;
    };

    let (result, _) = tokio::join!(discover, script);
    assert!(matches!(result, Err(HostError::ConnectionLost { connection: CONN })));
}

// ----------------------------------------------------------------------------
// Scanning
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn scan_deduplicates_by_address_and_merges_fields() {
    let (central, mut module) = test_central();

    let scan = central.scan(DiscoverMode::Generic, Duration::from_secs(1));
    let script = async {
        let command = module.expect_command().await;
        assert_eq!(command.key(), (0x06, 0x02));
        module.respond(MessageClass::Gap, 0x02, vec![0x00, 0x00]).await;

        let address = device_address();
        // Advertisement packet with flags, then a scan response with the
        // name, both from the same device.
        module
            .send_event(MessageClass::Gap, 0x00, scan_response_event(-70, 0, address, &[0x02, 0x01, 0x06]))
            .await;
        module
            .send_event(
                MessageClass::Gap,
                0x00,
                scan_response_event(-60, 4, address, &[0x06, 0x09, b'T', b'h', b'i', b'n', b'g']),
            )
            .await;

        let command = module.expect_command().await;
        assert_eq!(command.key(), (0x06, 0x04));
        module.respond(MessageClass::Gap, 0x04, vec![0x00, 0x00]).await;
    };

    let (devices, _) = tokio::join!(scan, script);
    let devices = devices.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].rssi, -60);
    assert_eq!(devices[0].advertisement.name.as_deref(), Some("Thing"));
    assert!(devices[0].advertisement.fields.contains_key(&0x01));
}
