//! Scripted radio module for integration tests
//!
//! Sits on the far end of an in-memory transport, parses the frames the
//! host sends, and injects scripted responses and events byte-by-byte
//! (the worst case for the frame parser).

#![allow(dead_code)]

use bgapi_core::frame::{FrameParser, Message, MessageClass, MessageKind};
use bgapi_core::payload::PayloadWriter;
use bgapi_core::types::{AddressType, BdAddr};
use bgapi_host::transport::{channel_transport, ChannelTransport, TransportPeer};

pub struct ScriptedModule {
    peer: TransportPeer,
    parser: FrameParser,
}

impl ScriptedModule {
    /// Build a transport pair and wrap the module end.
    pub fn attach() -> (ChannelTransport, ScriptedModule) {
        let (transport, peer) = channel_transport(64);
        (transport, ScriptedModule { peer, parser: FrameParser::new() })
    }

    /// Next complete command frame the host sent.
    pub async fn expect_command(&mut self) -> Message {
        loop {
            let chunk = self
                .peer
                .outbound
                .recv()
                .await
                .expect("host closed the transport while a command was expected");
            let mut messages = self.parser.feed(&chunk);
            if let Some(message) = messages.pop() {
                assert!(messages.is_empty(), "host sent more than one frame per command");
                return message;
            }
        }
    }

    /// Inject a response frame, one byte at a time.
    pub async fn respond(&self, class: MessageClass, id: u8, payload: Vec<u8>) {
        self.inject(MessageKind::CommandOrResponse, class, id, payload).await;
    }

    /// Inject an event frame, one byte at a time.
    pub async fn send_event(&self, class: MessageClass, id: u8, payload: Vec<u8>) {
        self.inject(MessageKind::Event, class, id, payload).await;
    }

    /// Inject raw bytes as-is.
    pub async fn send_raw(&self, bytes: Vec<u8>) {
        self.peer.inbound.send(bytes).await.expect("host dropped the transport");
    }

    /// Assert the host has nothing in flight on the wire.
    pub fn assert_idle(&mut self) {
        assert!(
            self.peer.outbound.try_recv().is_err(),
            "host sent a frame it should have queued"
        );
    }

    /// Closing the inbound side simulates the link going away.
    pub fn close(self) {
        drop(self.peer.inbound);
    }

    async fn inject(&self, kind: MessageKind, class: MessageClass, id: u8, payload: Vec<u8>) {
        let message = Message::new(kind, class as u8, id, payload).expect("scripted payload too large");
        for byte in message.encode() {
            self.send_raw(vec![byte]).await;
        }
    }
}

// ----------------------------------------------------------------------------
// Payload Builders
// ----------------------------------------------------------------------------

pub fn result_response(connection: u8, result: u16) -> Vec<u8> {
    PayloadWriter::new().u8(connection).u16_le(result).finish().to_vec()
}

pub fn connect_direct_response(result: u16, connection: u8) -> Vec<u8> {
    PayloadWriter::new().u16_le(result).u8(connection).finish().to_vec()
}

pub fn status_event(connection: u8, address: BdAddr, address_type: AddressType) -> Vec<u8> {
    PayloadWriter::new()
        .u8(connection)
        .u8(0x05) // connected | completed
        .bd_addr(address)
        .u8(address_type as u8)
        .u16_le(0x0030)
        .u16_le(0x0064)
        .u16_le(0x0000)
        .u8(0xff)
        .finish()
        .to_vec()
}

pub fn disconnected_event(connection: u8, reason: u16) -> Vec<u8> {
    PayloadWriter::new().u8(connection).u16_le(reason).finish().to_vec()
}

pub fn group_found_event(connection: u8, start: u16, end: u16, uuid: u16) -> Vec<u8> {
    PayloadWriter::new()
        .u8(connection)
        .u16_le(start)
        .u16_le(end)
        .u8_array(&uuid.to_le_bytes())
        .finish()
        .to_vec()
}

pub fn procedure_completed_event(connection: u8, result: u16, chr_handle: u16) -> Vec<u8> {
    PayloadWriter::new()
        .u8(connection)
        .u16_le(result)
        .u16_le(chr_handle)
        .finish()
        .to_vec()
}

pub fn find_information_found_event(connection: u8, handle: u16, uuid: u16) -> Vec<u8> {
    PayloadWriter::new()
        .u8(connection)
        .u16_le(handle)
        .u8_array(&uuid.to_le_bytes())
        .finish()
        .to_vec()
}

pub fn attribute_value_event(connection: u8, handle: u16, kind: u8, value: &[u8]) -> Vec<u8> {
    PayloadWriter::new()
        .u8(connection)
        .u16_le(handle)
        .u8(kind)
        .u8_array(value)
        .finish()
        .to_vec()
}

pub fn scan_response_event(rssi: i8, packet_type: u8, sender: BdAddr, data: &[u8]) -> Vec<u8> {
    PayloadWriter::new()
        .u8(rssi as u8)
        .u8(packet_type)
        .bd_addr(sender)
        .u8(AddressType::Public as u8)
        .u8(0xff) // no bond
        .u8_array(data)
        .finish()
        .to_vec()
}

/// A `read_by_type` record for one characteristic declaration.
pub fn declaration_record(properties: u8, value_handle: u16, uuid: u16) -> Vec<u8> {
    let mut v = vec![properties];
    v.extend_from_slice(&value_handle.to_le_bytes());
    v.extend_from_slice(&uuid.to_le_bytes());
    v
}
