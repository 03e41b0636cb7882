//! WebSocket codec for use with tokio_util::codec.
//!
//! The codec turns raw bytes into a sequence of WebSocket frames and back.
//! It works frame by frame; reassembly into messages is left to
//! [`MessageAssembler`](super::MessageAssembler) so control frames are never
//! held back behind a fragmented message.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::frame::{Role, WebSocketFrame};
use crate::error::WebSocketError;

/// WebSocket codec that implements tokio_util's Decoder and Encoder traits.
///
/// Use with `tokio_util::codec::Framed` to turn a byte stream into a
/// `Stream<Item = WebSocketFrame>` and `Sink<WebSocketFrame>`.
#[derive(Debug, Clone, Default)]
pub struct WebSocketCodec {
    role: Role,
    max_frame_size: Option<usize>,
}

impl WebSocketCodec {
    /// Create a server-side codec with no frame size limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec for the given role.
    pub fn with_role(role: Role) -> Self {
        Self {
            role,
            max_frame_size: None,
        }
    }

    /// Limit the payload size of decoded frames.
    pub fn max_frame_size(mut self, max: Option<usize>) -> Self {
        self.max_frame_size = max;
        self
    }

    /// The role this codec speaks for.
    pub fn role(&self) -> Role {
        self.role
    }
}

impl Decoder for WebSocketCodec {
    type Item = WebSocketFrame;
    type Error = WebSocketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(WebSocketFrame::decode(src, self.role, self.max_frame_size)?)
    }
}

impl Encoder<WebSocketFrame> for WebSocketCodec {
    type Error = WebSocketError;

    fn encode(&mut self, frame: WebSocketFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        frame.validate_outgoing(self.role)?;
        frame.encode(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::websocket::Opcode;

    #[test]
    fn test_decode_client_frame() {
        let mut client = WebSocketCodec::with_role(Role::Client);
        let mut server = WebSocketCodec::new();

        let mut buffer = BytesMut::new();
        client
            .encode(
                WebSocketFrame::new_text("hello", true).masked([1, 2, 3, 4]),
                &mut buffer,
            )
            .unwrap();

        let frame = server.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(frame.opcode(), Opcode::Text);
        assert!(frame.header.fin);
        assert_eq!(&frame.payload[..], b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_partial_then_complete() {
        let mut server = WebSocketCodec::new();
        let encoded = WebSocketFrame::new_binary(vec![9u8; 300], true)
            .masked([5, 6, 7, 8])
            .to_bytes();

        let mut buffer = BytesMut::from(&encoded[..100]);
        assert!(server.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(&encoded[100..]);
        let frame = server.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(frame.payload.len(), 300);
    }

    #[test]
    fn test_decode_back_to_back_frames() {
        let mut server = WebSocketCodec::new();
        let mut buffer = BytesMut::new();
        WebSocketFrame::new_text("one", true)
            .masked([1, 1, 1, 1])
            .encode(&mut buffer);
        WebSocketFrame::new_ping(&b"p"[..])
            .masked([2, 2, 2, 2])
            .encode(&mut buffer);

        let first = server.decode(&mut buffer).unwrap().unwrap();
        let second = server.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(first.payload_as_text(), Some("one"));
        assert_eq!(second.opcode(), Opcode::Ping);
        assert!(server.decode(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn test_server_encoder_refuses_masked_frame() {
        let mut server = WebSocketCodec::new();
        let mut buffer = BytesMut::new();
        let result = server.encode(
            WebSocketFrame::new_text("x", true).masked([1, 2, 3, 4]),
            &mut buffer,
        );
        assert!(matches!(
            result,
            Err(WebSocketError::Protocol(ProtocolError::MaskedFrame))
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_server_encode_then_client_decode() {
        let mut server = WebSocketCodec::new();
        let mut client = WebSocketCodec::with_role(Role::Client);
        let mut buffer = BytesMut::new();

        server
            .encode(WebSocketFrame::new_binary(vec![1, 2, 3], true), &mut buffer)
            .unwrap();
        let frame = client.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(frame.opcode(), Opcode::Binary);
        assert_eq!(&frame.payload[..], &[1, 2, 3]);
    }

    #[test]
    fn test_frame_size_limit() {
        let mut server = WebSocketCodec::new().max_frame_size(Some(8));
        let encoded = WebSocketFrame::new_binary(vec![0u8; 9], true)
            .masked([1, 2, 3, 4])
            .to_bytes();
        let mut buffer = BytesMut::from(&encoded[..]);
        assert!(matches!(
            server.decode(&mut buffer),
            Err(WebSocketError::Protocol(ProtocolError::FrameTooLarge { .. }))
        ));
    }
}
