//! Error types for WebSocket framing, handshakes and connection handling.

use std::{fmt, io};

use http::StatusCode;

/// Result type for WebSocket operations.
pub type WebSocketResult<T> = Result<T, WebSocketError>;

/// Violations of the RFC 6455 framing rules.
///
/// Every protocol error is fatal to the connection it occurred on. A
/// corrupted frame stream cannot be resynchronized, so the only recovery is
/// to close the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Opcode is one of the reserved values (0x3-0x7, 0xB-0xF)
    InvalidOpcode(u8),
    /// Reserved bits are set without a negotiated extension
    ReservedBitsSet(u8),
    /// Client sent a frame without the mask bit
    UnmaskedFrame,
    /// Server sent a frame with the mask bit
    MaskedFrame,
    /// Control frame payload exceeds 125 bytes
    ControlFrameTooLarge(u64),
    /// Control frame has FIN=0
    ControlFrameFragmented,
    /// 64-bit length field has its most significant bit set
    LengthOutOfRange(u64),
    /// Length was not written with the narrowest encoding
    NonMinimalLength(u64),
    /// Frame payload exceeds the configured limit
    FrameTooLarge {
        /// Maximum allowed size
        max: usize,
        /// Announced size
        actual: u64,
    },
    /// Reassembled message exceeds the configured limit
    MessageTooLarge {
        /// Maximum allowed size
        max: usize,
        /// Size reached
        actual: usize,
    },
    /// Continuation frame without a preceding fragmented message
    UnexpectedContinuation,
    /// New data frame while a fragmented message is still open
    ExpectedContinuation,
    /// Text message is not valid UTF-8
    InvalidUtf8,
    /// Close frame payload is malformed
    InvalidClosePayload,
}

impl ProtocolError {
    /// Status code to put in the close frame sent in response to this error.
    pub fn close_code(&self) -> u16 {
        use crate::websocket::close_code;

        match self {
            ProtocolError::InvalidUtf8 => close_code::INVALID_PAYLOAD,
            ProtocolError::FrameTooLarge { .. } | ProtocolError::MessageTooLarge { .. } => {
                close_code::MESSAGE_TOO_BIG
            }
            _ => close_code::PROTOCOL_ERROR,
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidOpcode(op) => write!(f, "Invalid WebSocket opcode: {:#x}", op),
            ProtocolError::ReservedBitsSet(rsv) => {
                write!(f, "Reserved bits set without extension: {:#05b}", rsv)
            }
            ProtocolError::UnmaskedFrame => write!(f, "Client frame is not masked"),
            ProtocolError::MaskedFrame => write!(f, "Server frame must not be masked"),
            ProtocolError::ControlFrameTooLarge(len) => {
                write!(f, "Control frame payload exceeds 125 bytes: {}", len)
            }
            ProtocolError::ControlFrameFragmented => write!(f, "Control frame is fragmented"),
            ProtocolError::LengthOutOfRange(len) => {
                write!(f, "Payload length out of range: {:#x}", len)
            }
            ProtocolError::NonMinimalLength(len) => {
                write!(f, "Payload length {} not minimally encoded", len)
            }
            ProtocolError::FrameTooLarge { max, actual } => {
                write!(f, "Frame too large: {} bytes (max {})", actual, max)
            }
            ProtocolError::MessageTooLarge { max, actual } => {
                write!(f, "Message too large: {} bytes (max {})", actual, max)
            }
            ProtocolError::UnexpectedContinuation => {
                write!(f, "Continuation frame without a fragmented message")
            }
            ProtocolError::ExpectedContinuation => {
                write!(f, "Expected continuation frame")
            }
            ProtocolError::InvalidUtf8 => write!(f, "Invalid UTF-8 in text message"),
            ProtocolError::InvalidClosePayload => write!(f, "Invalid close frame payload"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Failures of the opening handshake.
///
/// These surface before a socket exists, so they are reported to the HTTP
/// layer rather than to a socket consumer.
#[derive(Debug)]
pub enum HandshakeError {
    /// Request does not carry `Upgrade: websocket`
    NotUpgrade,
    /// `Sec-WebSocket-Key` header is absent or not a string
    MissingKey,
    /// The consumer side of the acceptor is gone
    AcceptorClosed,
    /// Connection could not be taken over for raw I/O
    Io(io::Error),
}

impl HandshakeError {
    /// HTTP status the host should answer a failed upgrade with.
    pub fn status(&self) -> StatusCode {
        match self {
            HandshakeError::NotUpgrade | HandshakeError::MissingKey => StatusCode::BAD_REQUEST,
            HandshakeError::AcceptorClosed => StatusCode::SERVICE_UNAVAILABLE,
            HandshakeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::NotUpgrade => write!(f, "Only support websocket protocol"),
            HandshakeError::MissingKey => write!(f, "Missing Sec-WebSocket-Key header"),
            HandshakeError::AcceptorClosed => write!(f, "Acceptor is closed"),
            HandshakeError::Io(e) => write!(f, "Handshake I/O error: {}", e),
        }
    }
}

impl std::error::Error for HandshakeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HandshakeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for HandshakeError {
    fn from(err: io::Error) -> Self {
        HandshakeError::Io(err)
    }
}

/// Errors surfaced by sockets and the acceptor.
#[derive(Debug)]
pub enum WebSocketError {
    /// Transport-level read or write failure
    Io(io::Error),
    /// Framing rule violation
    Protocol(ProtocolError),
    /// Opening handshake failure
    Handshake(HandshakeError),
    /// Acceptor has no more sockets to hand out
    EndOfStream,
    /// Socket is closed
    ConnectionClosed,
}

impl WebSocketError {
    /// Whether this is the normal acceptor termination signal.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, WebSocketError::EndOfStream)
    }
}

impl fmt::Display for WebSocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebSocketError::Io(e) => write!(f, "I/O error: {}", e),
            WebSocketError::Protocol(e) => write!(f, "Protocol error: {}", e),
            WebSocketError::Handshake(e) => write!(f, "Handshake error: {}", e),
            WebSocketError::EndOfStream => write!(f, "End of stream"),
            WebSocketError::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for WebSocketError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WebSocketError::Io(e) => Some(e),
            WebSocketError::Protocol(e) => Some(e),
            WebSocketError::Handshake(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WebSocketError {
    fn from(err: io::Error) -> Self {
        WebSocketError::Io(err)
    }
}

impl From<ProtocolError> for WebSocketError {
    fn from(err: ProtocolError) -> Self {
        WebSocketError::Protocol(err)
    }
}

impl From<HandshakeError> for WebSocketError {
    fn from(err: HandshakeError) -> Self {
        WebSocketError::Handshake(err)
    }
}
