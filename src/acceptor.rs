//! Hand-off between the host HTTP layer and the application.
//!
//! The host hands each upgrade request and its taken-over connection to an
//! [`Upgrader`]. Once the handshake completes the socket is queued, and the
//! application picks sockets up from the [`Acceptor`] in the order their
//! handshakes completed.
//!
//! The queue is bounded by [`WebSocketConfig::queue_capacity`]. While it is
//! full, `Upgrader::upgrade` waits, which holds back the HTTP layer from
//! completing further upgrades. A capacity of 1 serializes connection
//! establishment across the whole service.
//!
//! # Examples
//!
//! ```
//! use http_websocket::{WebSocketConfig, acceptor};
//! use tokio::io::DuplexStream;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (upgrader, mut acceptor) = acceptor::channel::<DuplexStream>(WebSocketConfig::default());
//!
//! let (_client, server) = tokio::io::duplex(1024);
//! let request = http::Request::builder()
//!     .uri("/ws")
//!     .header("Upgrade", "websocket")
//!     .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
//!     .body(())
//!     .unwrap();
//!
//! upgrader.upgrade(&request, server).await.unwrap();
//! drop(upgrader);
//!
//! let socket = acceptor.accept().await.unwrap();
//! assert!(!socket.is_closed());
//! assert!(acceptor.accept().await.unwrap_err().is_end_of_stream());
//! # }
//! ```

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures_core::Stream;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tracing::debug;

use crate::{
    config::WebSocketConfig,
    error::{HandshakeError, WebSocketError, WebSocketResult},
    extensions::RequestExt,
    websocket::WebSocket,
};

/// Create a connected upgrader/acceptor pair.
pub fn channel<S>(config: WebSocketConfig) -> (Upgrader<S>, Acceptor<S>) {
    let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
    (
        Upgrader {
            sender,
            config: Arc::new(config),
        },
        Acceptor { receiver },
    )
}

/// Producer side, used by the HTTP layer.
///
/// Cloneable; the acceptor reports end of stream once every upgrader has
/// been dropped and the queue is drained.
#[derive(Debug)]
pub struct Upgrader<S> {
    sender: mpsc::Sender<WebSocket<S>>,
    config: Arc<WebSocketConfig>,
}

impl<S> Clone for Upgrader<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S> Upgrader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Upgrade `stream` using the headers of `request`, then queue the socket.
    ///
    /// Requests without `Upgrade: websocket` fail with
    /// [`HandshakeError::NotUpgrade`] and leave `stream` untouched; the host
    /// answers those with [`handshake::reject`](crate::handshake::reject).
    pub async fn upgrade<B>(&self, request: &http::Request<B>, stream: S) -> Result<(), HandshakeError> {
        let socket_info = request.socket_info().copied();
        let remote = socket_info.and_then(|info| info.remote);

        if !request.is_websocket_upgrade() {
            debug!(remote = ?remote, uri = %request.uri(), "Rejected non-WebSocket request");
            return Err(HandshakeError::NotUpgrade);
        }
        if self.sender.is_closed() {
            return Err(HandshakeError::AcceptorClosed);
        }

        let socket = WebSocket::accept(stream, request.headers().clone(), (*self.config).clone())
            .await
            .inspect_err(|e| debug!(remote = ?remote, error = %e, "WebSocket handshake failed"))?
            .with_socket_info(socket_info);
        debug!(remote = ?remote, uri = %request.uri(), "WebSocket handshake completed");

        self.sender
            .send(socket)
            .await
            .map_err(|_| HandshakeError::AcceptorClosed)
    }

    /// Configuration given to every socket this upgrader produces.
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }
}

/// Consumer side, used by the application.
#[derive(Debug)]
pub struct Acceptor<S> {
    receiver: mpsc::Receiver<WebSocket<S>>,
}

impl<S> Acceptor<S> {
    /// Wait for the next upgraded socket.
    ///
    /// Fails with [`WebSocketError::EndOfStream`] once every [`Upgrader`] is
    /// gone and no sockets remain queued.
    pub async fn accept(&mut self) -> WebSocketResult<WebSocket<S>> {
        self.receiver.recv().await.ok_or(WebSocketError::EndOfStream)
    }

    /// Stop taking new upgrades. Sockets already queued can still be accepted.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

impl<S> Stream for Acceptor<S> {
    type Item = WebSocket<S>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
