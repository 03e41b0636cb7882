//! Message-level view of the frame stream: reassembly of fragmented data
//! frames and parsing of close payloads.

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::{Opcode, WebSocketFrame};
use crate::error::ProtocolError;

/// Close status codes from RFC 6455 Section 7.4.1.
pub mod close_code {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Endpoint is going away
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Unsupported data type
    pub const UNSUPPORTED: u16 = 1003;
    /// Payload inconsistent with the message type
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Policy violation
    pub const POLICY: u16 = 1008;
    /// Message too big to process
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    /// Unexpected server condition
    pub const INTERNAL_ERROR: u16 = 1011;

    /// Whether `code` may appear in a close frame on the wire.
    pub fn is_sendable(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
    }
}

/// Status code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// Close status code
    pub code: u16,
    /// Human-readable reason, possibly empty
    pub reason: String,
}

impl CloseFrame {
    /// Create a close frame payload.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Parse a close payload.
    ///
    /// An empty payload carries no status. Otherwise the first two bytes are a
    /// big-endian status code and the rest is a UTF-8 reason.
    pub fn parse(payload: &[u8]) -> Result<Option<Self>, ProtocolError> {
        match payload {
            [] => Ok(None),
            [_] => Err(ProtocolError::InvalidClosePayload),
            [hi, lo, reason @ ..] => {
                let code = u16::from_be_bytes([*hi, *lo]);
                if !close_code::is_sendable(code) {
                    return Err(ProtocolError::InvalidClosePayload);
                }
                let reason = std::str::from_utf8(reason)
                    .map_err(|_| ProtocolError::InvalidClosePayload)?;
                Ok(Some(CloseFrame::new(code, reason)))
            }
        }
    }
}

/// A complete application message or a control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 text message
    Text(String),
    /// Binary message
    Binary(Bytes),
    /// Ping with its application data
    Ping(Bytes),
    /// Pong with its application data
    Pong(Bytes),
    /// Close with optional status
    Close(Option<CloseFrame>),
}

impl Message {
    /// Build the single unfragmented server frame for this message.
    pub fn into_frame(self) -> WebSocketFrame {
        match self {
            Message::Text(text) => WebSocketFrame::new_text(text, true),
            Message::Binary(data) => WebSocketFrame::new_binary(data, true),
            Message::Ping(data) => WebSocketFrame::new_ping(data),
            Message::Pong(data) => WebSocketFrame::new_pong(data),
            Message::Close(Some(close)) => {
                WebSocketFrame::new_close(Some(close.code), Some(&close.reason))
            }
            Message::Close(None) => WebSocketFrame::new_close(None, None),
        }
    }

    /// Check if this is a close message.
    pub fn is_close(&self) -> bool {
        matches!(self, Message::Close(_))
    }

    /// Get the text of a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<Bytes> for Message {
    fn from(data: Bytes) -> Self {
        Message::Binary(data)
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::Binary(data.into())
    }
}

#[derive(Debug, Default)]
enum AssemblyState {
    #[default]
    Idle,
    Accumulating {
        opcode: Opcode,
        buffer: BytesMut,
    },
}

/// Reassembles fragmented data frames into messages.
///
/// Control frames pass straight through, even in the middle of a
/// fragmented message, while data fragments keep accumulating.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    state: AssemblyState,
    max_message_size: Option<usize>,
}

impl MessageAssembler {
    /// Create an assembler with an optional message size limit.
    pub fn new(max_message_size: Option<usize>) -> Self {
        Self {
            state: AssemblyState::Idle,
            max_message_size,
        }
    }

    /// Whether a fragmented message is in progress.
    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, AssemblyState::Accumulating { .. })
    }

    /// Feed one frame; returns a message once one is complete.
    pub fn push(&mut self, frame: WebSocketFrame) -> Result<Option<Message>, ProtocolError> {
        let fin = frame.header.fin;
        match frame.header.opcode {
            Opcode::Ping => Ok(Some(Message::Ping(frame.payload))),
            Opcode::Pong => Ok(Some(Message::Pong(frame.payload))),
            Opcode::Close => Ok(Some(Message::Close(CloseFrame::parse(&frame.payload)?))),
            Opcode::Text | Opcode::Binary => {
                if self.is_accumulating() {
                    return Err(ProtocolError::ExpectedContinuation);
                }
                self.check_size(frame.payload.len())?;
                if fin {
                    return complete(frame.header.opcode, frame.payload).map(Some);
                }
                self.state = AssemblyState::Accumulating {
                    opcode: frame.header.opcode,
                    buffer: BytesMut::from(&frame.payload[..]),
                };
                Ok(None)
            }
            Opcode::Continuation => {
                let max = self.max_message_size;
                let AssemblyState::Accumulating { buffer, .. } = &mut self.state else {
                    return Err(ProtocolError::UnexpectedContinuation);
                };
                let size = buffer.len() + frame.payload.len();
                if let Some(max) = max.filter(|max| size > *max) {
                    return Err(ProtocolError::MessageTooLarge { max, actual: size });
                }
                buffer.put_slice(&frame.payload);
                if !fin {
                    return Ok(None);
                }
                match std::mem::take(&mut self.state) {
                    AssemblyState::Accumulating { opcode, buffer } => {
                        complete(opcode, buffer.freeze()).map(Some)
                    }
                    AssemblyState::Idle => Err(ProtocolError::UnexpectedContinuation),
                }
            }
            Opcode::Reserved(value) => Err(ProtocolError::InvalidOpcode(value)),
        }
    }

    fn check_size(&self, size: usize) -> Result<(), ProtocolError> {
        match self.max_message_size {
            Some(max) if size > max => Err(ProtocolError::MessageTooLarge { max, actual: size }),
            _ => Ok(()),
        }
    }
}

fn complete(opcode: Opcode, payload: Bytes) -> Result<Message, ProtocolError> {
    match opcode {
        Opcode::Text => String::from_utf8(payload.to_vec())
            .map(Message::Text)
            .map_err(|_| ProtocolError::InvalidUtf8),
        _ => Ok(Message::Binary(payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame_messages() {
        let mut assembler = MessageAssembler::default();

        let message = assembler
            .push(WebSocketFrame::new_text("Hello", true))
            .unwrap();
        assert_eq!(message, Some(Message::Text("Hello".to_string())));

        let message = assembler
            .push(WebSocketFrame::new_binary(vec![1, 2, 3], true))
            .unwrap();
        assert_eq!(message, Some(Message::Binary(Bytes::from_static(&[1, 2, 3]))));
    }

    #[test]
    fn test_fragmented_message() {
        let mut assembler = MessageAssembler::default();

        assert_eq!(
            assembler.push(WebSocketFrame::new_text("Hel", false)),
            Ok(None)
        );
        assert!(assembler.is_accumulating());
        assert_eq!(
            assembler.push(WebSocketFrame::new_continuation(&b"l"[..], false)),
            Ok(None)
        );
        let message = assembler
            .push(WebSocketFrame::new_continuation(&b"o"[..], true))
            .unwrap();
        assert_eq!(message, Some(Message::Text("Hello".to_string())));
        assert!(!assembler.is_accumulating());
    }

    #[test]
    fn test_control_frame_during_fragmentation() {
        let mut assembler = MessageAssembler::default();

        assembler
            .push(WebSocketFrame::new_binary(vec![1], false))
            .unwrap();
        let ping = assembler
            .push(WebSocketFrame::new_ping(&b"are you there"[..]))
            .unwrap();
        assert_eq!(ping, Some(Message::Ping(Bytes::from_static(b"are you there"))));
        assert!(assembler.is_accumulating());

        let message = assembler
            .push(WebSocketFrame::new_continuation(vec![2], true))
            .unwrap();
        assert_eq!(message, Some(Message::Binary(Bytes::from_static(&[1, 2]))));
    }

    #[test]
    fn test_unexpected_continuation() {
        let mut assembler = MessageAssembler::default();
        assert_eq!(
            assembler.push(WebSocketFrame::new_continuation(vec![1], true)),
            Err(ProtocolError::UnexpectedContinuation)
        );
    }

    #[test]
    fn test_data_frame_while_accumulating() {
        let mut assembler = MessageAssembler::default();
        assembler
            .push(WebSocketFrame::new_text("a", false))
            .unwrap();
        assert_eq!(
            assembler.push(WebSocketFrame::new_text("b", true)),
            Err(ProtocolError::ExpectedContinuation)
        );
    }

    #[test]
    fn test_invalid_utf8_across_fragments() {
        let mut assembler = MessageAssembler::default();
        // "é" is 0xC3 0xA9, split across two frames
        assembler
            .push(WebSocketFrame::new_data(Opcode::Text, vec![0xC3], false))
            .unwrap();
        let message = assembler
            .push(WebSocketFrame::new_continuation(vec![0xA9], true))
            .unwrap();
        assert_eq!(message, Some(Message::Text("é".to_string())));

        assembler
            .push(WebSocketFrame::new_data(Opcode::Text, vec![0xC3], false))
            .unwrap();
        assert_eq!(
            assembler.push(WebSocketFrame::new_continuation(vec![0x41], true)),
            Err(ProtocolError::InvalidUtf8)
        );
    }

    #[test]
    fn test_message_size_limit() {
        let mut assembler = MessageAssembler::new(Some(4));
        assembler
            .push(WebSocketFrame::new_binary(vec![0; 3], false))
            .unwrap();
        assert_eq!(
            assembler.push(WebSocketFrame::new_continuation(vec![0; 2], true)),
            Err(ProtocolError::MessageTooLarge { max: 4, actual: 5 })
        );
    }

    #[test]
    fn test_close_payload() {
        let mut assembler = MessageAssembler::default();
        let message = assembler
            .push(WebSocketFrame::new_close(Some(1000), Some("Normal closure")))
            .unwrap();
        assert_eq!(
            message,
            Some(Message::Close(Some(CloseFrame::new(1000, "Normal closure"))))
        );

        let message = assembler
            .push(WebSocketFrame::new_close(None, None))
            .unwrap();
        assert_eq!(message, Some(Message::Close(None)));
    }

    #[test]
    fn test_invalid_close_payloads() {
        assert_eq!(
            CloseFrame::parse(&[0x03]),
            Err(ProtocolError::InvalidClosePayload)
        );
        // 1005 is reserved for local use
        assert_eq!(
            CloseFrame::parse(&1005u16.to_be_bytes()),
            Err(ProtocolError::InvalidClosePayload)
        );
        assert_eq!(
            CloseFrame::parse(&[0x03, 0xE8, 0xFF]),
            Err(ProtocolError::InvalidClosePayload)
        );
        assert_eq!(
            CloseFrame::parse(&4000u16.to_be_bytes()),
            Ok(Some(CloseFrame::new(4000, "")))
        );
    }

    #[test]
    fn test_into_frame() {
        let frame = Message::from("hi").into_frame();
        assert!(frame.is_text());
        assert!(frame.header.fin);
        assert!(!frame.header.masked);

        let frame = Message::Close(Some(CloseFrame::new(1001, "bye"))).into_frame();
        assert!(frame.is_close());
        assert_eq!(&frame.payload[..], &[0x03, 0xE9, b'b', b'y', b'e']);
    }
}
