//! BGAPI frame format and resynchronizing parser
//!
//! Every BGAPI message travels as a 4-byte header followed by a payload:
//!
//! ```text
//! byte 0: bit7 = kind (0 = command/response, 1 = event), bits 6..0 reserved (zero)
//! byte 1: payload length, 0..=64
//! byte 2: message class
//! byte 3: message id (class-scoped)
//! bytes 4..4+length: payload
//! ```
//!
//! The parser is a strict left-to-right state machine fed one byte at a
//! time. It never looks ahead and never trusts a corrupted length field:
//! resynchronization after garbage is byte-at-a-time discard until a
//! plausible kind byte appears again.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Hard ceiling on the header length field.
pub const MAX_FRAME_PAYLOAD: usize = 64;

/// Practical payload ceiling for messages we construct ourselves,
/// bounded by the module's transport MTU.
pub const MAX_MESSAGE_PAYLOAD: usize = 60;

/// Bit 7 of the first header byte.
const KIND_EVENT_BIT: u8 = 0x80;

/// Message payload buffer, inline up to the inbound frame ceiling.
pub type Payload = SmallVec<[u8; MAX_FRAME_PAYLOAD]>;

// ----------------------------------------------------------------------------
// Message Kinds and Classes
// ----------------------------------------------------------------------------

/// Direction/kind bit of a frame.
///
/// Commands and responses share an encoding; only context (who sent the
/// frame) tells them apart. A host client only ever *receives* responses
/// and events, and only ever *sends* commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    CommandOrResponse,
    Event,
}

/// Protocol classes defined by BGAPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageClass {
    System = 0x00,
    PersistentStore = 0x01,
    AttributeDatabase = 0x02,
    Connection = 0x03,
    AttributeClient = 0x04,
    SecurityManager = 0x05,
    Gap = 0x06,
    Hardware = 0x07,
    Testing = 0x08,
    Dfu = 0x09,
}

impl MessageClass {
    /// Convert from the raw class byte, returning None for unknown values
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::System),
            0x01 => Some(Self::PersistentStore),
            0x02 => Some(Self::AttributeDatabase),
            0x03 => Some(Self::Connection),
            0x04 => Some(Self::AttributeClient),
            0x05 => Some(Self::SecurityManager),
            0x06 => Some(Self::Gap),
            0x07 => Some(Self::Hardware),
            0x08 => Some(Self::Testing),
            0x09 => Some(Self::Dfu),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// One complete BGAPI frame, immutable once constructed.
///
/// The class byte is kept raw: routing to a known [`MessageClass`] is the
/// dispatcher's job, and unknown classes must survive parsing so they can
/// be dropped there rather than corrupting the byte stream here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub class: u8,
    pub id: u8,
    pub payload: Payload,
}

/// Error constructing an outbound frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("payload of {len} bytes exceeds the {MAX_MESSAGE_PAYLOAD}-byte frame limit")]
    PayloadTooLarge { len: usize },
}

impl Message {
    /// Build a message, enforcing the payload ceiling.
    pub fn new(
        kind: MessageKind,
        class: u8,
        id: u8,
        payload: impl Into<Payload>,
    ) -> Result<Self, FrameError> {
        let payload = payload.into();
        if payload.len() > MAX_MESSAGE_PAYLOAD {
            return Err(FrameError::PayloadTooLarge { len: payload.len() });
        }
        Ok(Self { kind, class, id, payload })
    }

    /// Shorthand for an outbound command frame.
    pub fn command(class: MessageClass, id: u8, payload: impl Into<Payload>) -> Result<Self, FrameError> {
        Self::new(MessageKind::CommandOrResponse, class as u8, id, payload)
    }

    /// Correlation key: `(class, id)`.
    pub fn key(&self) -> (u8, u8) {
        (self.class, self.id)
    }

    /// Encode to wire bytes: header then payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.payload.len());
        let kind_byte = match self.kind {
            MessageKind::CommandOrResponse => 0x00,
            MessageKind::Event => KIND_EVENT_BIT,
        };
        out.push(kind_byte);
        out.push(self.payload.len() as u8);
        out.push(self.class);
        out.push(self.id);
        out.extend_from_slice(&self.payload);
        out
    }
}

// ----------------------------------------------------------------------------
// Frame Parser
// ----------------------------------------------------------------------------

/// Incremental frame parser.
///
/// Header fields are consumed in strict order (`kind`, `length`, `class`,
/// `id`) followed by exactly `length` payload bytes. Framing failures are
/// handled internally by resetting and rescanning; they are never surfaced
/// to the caller because the stream is self-healing at this layer.
#[derive(Debug, Default)]
pub struct FrameParser {
    kind: Option<MessageKind>,
    length: Option<u8>,
    class: Option<u8>,
    id: Option<u8>,
    accumulated: Payload,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a single byte, returning a message when one completes.
    pub fn push(&mut self, byte: u8) -> Option<Message> {
        let Some(kind) = self.kind else {
            // Scanning for a kind byte: bits 6..0 are the reserved
            // length-high field and must be zero, anything else is
            // discarded without note until the stream realigns.
            if byte & !KIND_EVENT_BIT != 0 {
                tracing::trace!(byte, "discarding byte while scanning for frame start");
                return None;
            }
            self.kind = Some(if byte & KIND_EVENT_BIT != 0 {
                MessageKind::Event
            } else {
                MessageKind::CommandOrResponse
            });
            return None;
        };

        let Some(length) = self.length else {
            if byte as usize > MAX_FRAME_PAYLOAD {
                // A corrupted length field cannot be trusted for
                // frame-skipping; drop the whole header and rescan.
                tracing::trace!(length = byte, "frame length over limit, resynchronizing");
                self.reset();
                return None;
            }
            self.length = Some(byte);
            return None;
        };

        if self.class.is_none() {
            self.class = Some(byte);
            return None;
        }

        if self.id.is_none() {
            self.id = Some(byte);
            if length == 0 {
                return self.complete(kind);
            }
            return None;
        }

        debug_assert!(self.accumulated.len() < length as usize);
        self.accumulated.push(byte);
        if self.accumulated.len() == length as usize {
            return self.complete(kind);
        }
        None
    }

    /// Feed a chunk, draining every message it completes, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Message> {
        let mut out = Vec::new();
        for &b in bytes {
            if let Some(msg) = self.push(b) {
                out.push(msg);
            }
        }
        out
    }

    fn complete(&mut self, kind: MessageKind) -> Option<Message> {
        let msg = Message {
            kind,
            class: self.class.take()?,
            id: self.id.take()?,
            payload: std::mem::take(&mut self.accumulated),
        };
        self.reset();
        tracing::trace!(class = msg.class, id = msg.id, len = msg.payload.len(), "frame complete");
        Some(msg)
    }

    fn reset(&mut self) {
        self.kind = None;
        self.length = None;
        self.class = None;
        self.id = None;
        self.accumulated.clear();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse_one_by_one(parser: &mut FrameParser, bytes: &[u8]) -> Vec<Message> {
        bytes.iter().filter_map(|&b| parser.push(b)).collect()
    }

    #[test]
    fn empty_payload_completes_after_id_byte() {
        let mut parser = FrameParser::new();
        let messages = parse_one_by_one(&mut parser, &[0x00, 0x00, 0x00, 0x01]);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::CommandOrResponse);
        assert_eq!(messages[0].key(), (0x00, 0x01));
        assert!(messages[0].payload.is_empty());
    }

    #[test]
    fn reserved_bits_in_kind_byte_are_discarded() {
        let mut parser = FrameParser::new();
        let frame = Message::command(MessageClass::Gap, 0x02, vec![0x01]).unwrap();

        // Corrupted garbage, then a clean frame.
        let mut stream = vec![0x7f, 0x01, 0xff];
        stream.extend_from_slice(&frame.encode());

        let messages = parse_one_by_one(&mut parser, &stream);
        assert_eq!(messages, vec![frame]);
    }

    #[test]
    fn oversize_length_resets_the_whole_header() {
        let mut parser = FrameParser::new();
        let frame = Message::command(MessageClass::System, 0x01, vec![]).unwrap();

        // Kind byte accepted, then an impossible length. The parser must
        // not treat the following bytes as class/id of the broken frame.
        let mut stream = vec![0x80, 0x55];
        stream.extend_from_slice(&frame.encode());

        let messages = parse_one_by_one(&mut parser, &stream);
        assert_eq!(messages, vec![frame]);
    }

    #[test]
    fn back_to_back_frames_parse_independently() {
        let mut parser = FrameParser::new();
        let a = Message::new(MessageKind::Event, 0x04, 0x02, vec![1, 2, 3]).unwrap();
        let b = Message::new(MessageKind::Event, 0x04, 0x01, vec![9]).unwrap();

        let mut stream = a.encode();
        stream.extend_from_slice(&b.encode());

        assert_eq!(parse_one_by_one(&mut parser, &stream), vec![a, b]);
    }

    #[test]
    fn inbound_frame_at_the_length_ceiling_parses() {
        // Inbound frames may carry the full 64 bytes the length field
        // allows, beyond what we construct for outbound commands.
        let mut parser = FrameParser::new();
        let mut stream = vec![0x80, 64, 0x04, 0x05];
        stream.extend_from_slice(&[0xab; 64]);

        let messages = parse_one_by_one(&mut parser, &stream);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload.len(), 64);
        assert_eq!(messages[0].payload.as_slice(), &[0xab; 64][..]);
    }

    #[test]
    fn rejects_oversize_outbound_payload() {
        let err = Message::command(MessageClass::AttributeClient, 0x05, vec![0u8; 61]);
        assert!(matches!(err, Err(FrameError::PayloadTooLarge { len: 61 })));
    }

    proptest! {
        #[test]
        fn frame_round_trip(
            is_event in any::<bool>(),
            class in 0u8..=0x09,
            id in any::<u8>(),
            payload in proptest::collection::vec(any::<u8>(), 0..=60),
        ) {
            let kind = if is_event { MessageKind::Event } else { MessageKind::CommandOrResponse };
            let msg = Message::new(kind, class, id, payload).unwrap();

            let mut parser = FrameParser::new();
            let parsed = parse_one_by_one(&mut parser, &msg.encode());
            prop_assert_eq!(parsed, vec![msg]);
        }
    }
}
