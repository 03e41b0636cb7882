//! Server side of the WebSocket protocol (RFC 6455) on top of the http crate.
//!
//! A host HTTP layer detects upgrade requests and hands each taken-over
//! connection to an [`Upgrader`]. The handshake is answered on the raw
//! stream and the resulting [`WebSocket`] is queued for the application,
//! which picks it up from the [`Acceptor`] and exchanges frames until the
//! connection closes.
//!
//! ```
//! use http_websocket::{Message, WebSocketConfig, WebSocketFrame, acceptor};
//! use tokio::io::{AsyncWriteExt, DuplexStream};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (upgrader, mut acceptor) = acceptor::channel::<DuplexStream>(WebSocketConfig::default());
//! let (mut client, server) = tokio::io::duplex(4096);
//!
//! let request = http::Request::builder()
//!     .header("Upgrade", "websocket")
//!     .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
//!     .body(())
//!     .unwrap();
//! upgrader.upgrade(&request, server).await.unwrap();
//!
//! // The client masks everything it sends
//! let hello = WebSocketFrame::new_text("hello", true).masked([1, 2, 3, 4]);
//! client.write_all(&hello.to_bytes()).await.unwrap();
//!
//! let mut socket = acceptor.accept().await.unwrap();
//! let message = socket.receive_message().await.unwrap();
//! assert_eq!(message, Message::Text("hello".to_string()));
//! # }
//! ```

#![warn(clippy::dbg_macro, clippy::print_stdout)]
#![warn(missing_docs)]

pub mod acceptor;
pub mod config;
pub mod error;
pub mod extensions;
pub mod handshake;

/// WebSocket frame codec and sockets for RFC 6455 compliant framing
pub mod websocket;

pub use acceptor::{Acceptor, Upgrader};
pub use config::WebSocketConfig;
pub use error::{HandshakeError, ProtocolError, WebSocketError, WebSocketResult};
pub use extensions::{RequestBuilderExt, RequestExt, SocketInfo};
pub use websocket::{
    CloseFrame, CloseHandle, FrameHeader, Message, Opcode, Role, SocketState, WebSocket,
    WebSocketCodec, WebSocketFrame,
};
