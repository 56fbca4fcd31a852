//! End-to-end walkthrough against a simulated radio module.
//!
//! Spawns a fake module on the far end of an in-memory transport, then
//! runs the usual central workflow: scan, connect, discover services
//! and characteristics, read a value, disconnect.
//!
//! Run with: `cargo run --example simulated_module`

use std::time::Duration;

use bgapi_core::frame::{FrameParser, Message, MessageClass, MessageKind};
use bgapi_core::payload::PayloadWriter;
use bgapi_core::types::{AddressType, BdAddr};
use bgapi_host::transport::{channel_transport, TransportPeer};
use bgapi_host::{Central, HostConfig, WriteMode};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let (transport, peer) = channel_transport(64);
    tokio::spawn(simulated_module(peer));

    let central = Central::new(transport, HostConfig::default());

    let devices = central
        .scan(Default::default(), Duration::from_millis(300))
        .await?;
    for device in &devices {
        tracing::info!(
            address = %device.address,
            rssi = device.rssi,
            name = device.advertisement.name.as_deref().unwrap_or("<unnamed>"),
            "discovered"
        );
    }

    let address: BdAddr = "AA:BB:CC:DD:EE:FF".parse()?;
    let peripheral = central.connect(address, AddressType::Public).await?;

    for service in central.discover_services(&peripheral).await? {
        tracing::info!(uuid = %service.uuid, start = service.start_handle, end = service.end_handle, "service");
        for characteristic in central.discover_characteristics(&service).await? {
            tracing::info!(uuid = %characteristic.uuid, value_handle = characteristic.value_handle, "characteristic");
            if characteristic.properties.can_read() {
                let value = central.read(&characteristic).await?;
                tracing::info!(value = %hex::encode(&value), "read");
            }
            if characteristic.properties.can_write() {
                central
                    .write(&characteristic, b"hi", WriteMode::WithResponse)
                    .await?;
            }
        }
    }

    central.disconnect(&peripheral).await?;
    Ok(())
}

/// A minimal scripted module: one device in range, one service with one
/// readable and writable characteristic.
async fn simulated_module(mut peer: TransportPeer) {
    let mut parser = FrameParser::new();
    let address: BdAddr = "AA:BB:CC:DD:EE:FF".parse().unwrap();

    while let Some(chunk) = peer.outbound.recv().await {
        for command in parser.feed(&chunk) {
            let reply: Vec<(MessageKind, MessageClass, u8, Vec<u8>)> = match (command.class, command.id) {
                // gap discover: ack, then one advertisement
                (0x06, 0x02) => vec![
                    (MessageKind::CommandOrResponse, MessageClass::Gap, 0x02, ok_result()),
                    (
                        MessageKind::Event,
                        MessageClass::Gap,
                        0x00,
                        PayloadWriter::new()
                            .u8(0xc4)
                            .u8(0x00)
                            .bd_addr(address)
                            .u8(0x00)
                            .u8(0xff)
                            .u8_array(&[0x02, 0x01, 0x06, 0x05, 0x09, b'D', b'e', b'm', b'o'])
                            .finish()
                            .to_vec(),
                    ),
                ],
                // gap end procedure
                (0x06, 0x04) => vec![(MessageKind::CommandOrResponse, MessageClass::Gap, 0x04, ok_result())],
                // gap connect direct: ack with handle 1, then status event
                (0x06, 0x03) => vec![
                    (
                        MessageKind::CommandOrResponse,
                        MessageClass::Gap,
                        0x03,
                        PayloadWriter::new().u16_le(0).u8(1).finish().to_vec(),
                    ),
                    (
                        MessageKind::Event,
                        MessageClass::Connection,
                        0x00,
                        PayloadWriter::new()
                            .u8(1)
                            .u8(0x05)
                            .bd_addr(address)
                            .u8(0x00)
                            .u16_le(0x0030)
                            .u16_le(0x0064)
                            .u16_le(0x0000)
                            .u8(0xff)
                            .finish()
                            .to_vec(),
                    ),
                ],
                // read by group type: one service 0x180F, then done
                (0x04, 0x01) => vec![
                    (MessageKind::CommandOrResponse, MessageClass::AttributeClient, 0x01, conn_result(1)),
                    (
                        MessageKind::Event,
                        MessageClass::AttributeClient,
                        0x02,
                        PayloadWriter::new()
                            .u8(1)
                            .u16_le(0x0001)
                            .u16_le(0x0005)
                            .u8_array(&0x180fu16.to_le_bytes())
                            .finish()
                            .to_vec(),
                    ),
                    (MessageKind::Event, MessageClass::AttributeClient, 0x01, completed(1, 0)),
                ],
                // read by type: one declaration, then done
                (0x04, 0x02) => vec![
                    (MessageKind::CommandOrResponse, MessageClass::AttributeClient, 0x02, conn_result(1)),
                    (
                        MessageKind::Event,
                        MessageClass::AttributeClient,
                        0x05,
                        PayloadWriter::new()
                            .u8(1)
                            .u16_le(0x0002)
                            .u8(0x03)
                            .u8_array(&[0x0a, 0x03, 0x00, 0x19, 0x2a])
                            .finish()
                            .to_vec(),
                    ),
                    (MessageKind::Event, MessageClass::AttributeClient, 0x01, completed(1, 0)),
                ],
                // read by handle: battery level 100%
                (0x04, 0x04) => vec![
                    (MessageKind::CommandOrResponse, MessageClass::AttributeClient, 0x04, conn_result(1)),
                    (
                        MessageKind::Event,
                        MessageClass::AttributeClient,
                        0x05,
                        PayloadWriter::new()
                            .u8(1)
                            .u16_le(0x0003)
                            .u8(0x00)
                            .u8_array(&[100])
                            .finish()
                            .to_vec(),
                    ),
                ],
                // acknowledged write
                (0x04, 0x05) => vec![
                    (MessageKind::CommandOrResponse, MessageClass::AttributeClient, 0x05, conn_result(1)),
                    (MessageKind::Event, MessageClass::AttributeClient, 0x01, completed(1, 0x0003)),
                ],
                // disconnect: ack, then the disconnected event with the
                // local-termination reason
                (0x03, 0x00) => vec![
                    (MessageKind::CommandOrResponse, MessageClass::Connection, 0x00, conn_result(1)),
                    (
                        MessageKind::Event,
                        MessageClass::Connection,
                        0x04,
                        PayloadWriter::new().u8(1).u16_le(0x0216).finish().to_vec(),
                    ),
                ],
                (class, id) => {
                    tracing::warn!(class, id, "simulated module has no script for this command");
                    continue;
                }
            };
            for (kind, class, id, payload) in reply {
                let frame = Message::new(kind, class as u8, id, payload).unwrap();
                if peer.inbound.send(frame.encode()).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn ok_result() -> Vec<u8> {
    PayloadWriter::new().u16_le(0).finish().to_vec()
}

fn conn_result(connection: u8) -> Vec<u8> {
    PayloadWriter::new().u8(connection).u16_le(0).finish().to_vec()
}

fn completed(connection: u8, chr_handle: u16) -> Vec<u8> {
    PayloadWriter::new()
        .u8(connection)
        .u16_le(0)
        .u16_le(chr_handle)
        .finish()
        .to_vec()
}
