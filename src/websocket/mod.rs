//! WebSocket framing conforming to RFC 6455.
//!
//! This module provides frame parsing and encoding, a `tokio_util` codec,
//! message reassembly, and the per-connection [`WebSocket`] socket.

mod codec;
mod frame;
mod message;
mod socket;

pub use codec::WebSocketCodec;
pub use frame::{FrameHeader, MAX_CONTROL_PAYLOAD, Opcode, Role, WebSocketFrame, apply_mask};
pub use message::{CloseFrame, Message, MessageAssembler, close_code};
pub use socket::{CloseHandle, SocketState, WebSocket};
