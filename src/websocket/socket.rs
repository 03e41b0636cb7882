//! A WebSocket connection over a taken-over byte stream.
//!
//! `WebSocket` owns the stream exclusively. Reads go through a growing
//! buffer and the [`WebSocketCodec`]; writes are encoded and flushed before
//! `send` returns, so back-pressure from a slow peer shows up as a slow
//! `send`.

use std::{io, sync::Arc};

use bytes::BytesMut;
use http::HeaderMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use super::{
    codec::WebSocketCodec,
    frame::{MAX_CONTROL_PAYLOAD, Role, WebSocketFrame},
    message::{Message, MessageAssembler},
};
use crate::{
    config::WebSocketConfig,
    error::{HandshakeError, WebSocketError, WebSocketResult},
    extensions::SocketInfo,
    handshake,
};

/// Lifecycle of a socket. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Frames can be sent and received
    Open,
    /// Closed locally, by the peer, or after an error
    Closed,
}

/// Closes a socket from another task.
///
/// A receive or send blocked on the socket returns
/// [`WebSocketError::ConnectionClosed`] as soon as `close` is called.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    /// Request the socket to close.
    pub fn close(&self) {
        self.signal.send_replace(true);
    }

    /// Whether the socket has been asked to close or has closed.
    pub fn is_closed(&self) -> bool {
        *self.signal.borrow()
    }
}

/// Server side of one upgraded WebSocket connection.
#[derive(Debug)]
pub struct WebSocket<S> {
    stream: S,
    codec: WebSocketCodec,
    assembler: MessageAssembler,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    state: SocketState,
    close_sent: bool,
    close_signal: Arc<watch::Sender<bool>>,
    close_rx: watch::Receiver<bool>,
    headers: HeaderMap,
    socket_info: Option<SocketInfo>,
    config: WebSocketConfig,
}

impl<S> WebSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Perform the opening handshake on a raw stream and wrap it.
    ///
    /// Reads `Sec-WebSocket-Key` from `headers`, writes the 101 response and
    /// flushes it before returning an open socket.
    pub async fn accept(
        mut stream: S,
        headers: HeaderMap,
        config: WebSocketConfig,
    ) -> Result<Self, HandshakeError> {
        let accept = handshake::accept_key(handshake::client_key(&headers)?);
        stream.write_all(&handshake::response_bytes(&accept)).await?;
        stream.flush().await?;

        Ok(Self::from_upgraded(stream, headers, config))
    }

    /// Wrap a stream whose handshake response has already been sent.
    pub fn from_upgraded(stream: S, headers: HeaderMap, config: WebSocketConfig) -> Self {
        let (close_signal, close_rx) = watch::channel(false);
        WebSocket {
            stream,
            codec: WebSocketCodec::with_role(Role::Server).max_frame_size(config.max_frame_size),
            assembler: MessageAssembler::new(config.max_message_size),
            read_buffer: BytesMut::with_capacity(config.read_buffer_size),
            write_buffer: BytesMut::new(),
            state: SocketState::Open,
            close_sent: false,
            close_signal: Arc::new(close_signal),
            close_rx,
            headers,
            socket_info: None,
            config,
        }
    }

    /// Attach the peer addresses recorded by the host.
    pub fn with_socket_info(mut self, info: Option<SocketInfo>) -> Self {
        self.socket_info = info;
        self
    }

    /// Read the next frame, in wire order.
    ///
    /// Any I/O or protocol error closes the socket. On a protocol error a
    /// close frame with the matching status is sent first when
    /// `close_on_protocol_error` is set.
    pub async fn receive(&mut self) -> WebSocketResult<WebSocketFrame> {
        self.ensure_open().await?;
        match self.read_frame().await {
            Ok(frame) => Ok(frame),
            Err(err) => {
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    /// Read the next complete message.
    ///
    /// Fragmented data frames are reassembled; control frames are returned
    /// as soon as they arrive. Pings are answered when `auto_pong` is set and
    /// a close from the peer is echoed before the socket shuts down.
    pub async fn receive_message(&mut self) -> WebSocketResult<Message> {
        loop {
            let frame = self.receive().await?;
            let message = match self.assembler.push(frame) {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    let err = WebSocketError::from(e);
                    self.fail(&err).await;
                    return Err(err);
                }
            };

            match &message {
                Message::Ping(data) if self.config.auto_pong => {
                    self.send(WebSocketFrame::new_pong(data.clone())).await?;
                }
                Message::Close(close) => {
                    if !self.close_sent {
                        let code = close.as_ref().map(|close| close.code);
                        // Peer is leaving either way
                        if let Err(e) = self.send(WebSocketFrame::new_close(code, None)).await {
                            debug!(remote = ?self.remote(), error = %e, "Failed to echo close frame");
                        }
                    }
                    self.teardown().await;
                }
                _ => {}
            }
            return Ok(message);
        }
    }

    /// Encode and write one frame, returning once it is flushed.
    ///
    /// A frame that is illegal for a server to send is refused without
    /// touching the connection. I/O failures close the socket.
    pub async fn send(&mut self, frame: WebSocketFrame) -> WebSocketResult<()> {
        self.ensure_open().await?;

        let is_close = frame.is_close();
        self.write_buffer.clear();
        self.codec.encode(frame, &mut self.write_buffer)?;

        if let Err(err) = self.flush_write_buffer().await {
            self.fail(&err).await;
            return Err(err);
        }
        if is_close {
            self.close_sent = true;
        }
        Ok(())
    }

    /// Send a message as a single frame.
    pub async fn send_message(&mut self, message: impl Into<Message>) -> WebSocketResult<()> {
        self.send(message.into().into_frame()).await
    }

    /// Close the connection without a close frame.
    ///
    /// Closing an already closed socket does nothing.
    pub async fn close(&mut self) -> WebSocketResult<()> {
        self.teardown().await;
        Ok(())
    }

    /// Send a close frame with `code` and `reason`, then close the connection.
    ///
    /// `reason` is cut at a character boundary so the close payload fits in
    /// a control frame.
    pub async fn close_with(&mut self, code: u16, reason: &str) -> WebSocketResult<()> {
        if self.state == SocketState::Closed {
            return Ok(());
        }
        let reason = truncate_reason(reason);
        let result = self
            .send(WebSocketFrame::new_close(Some(code), Some(reason)))
            .await;
        self.teardown().await;
        match result {
            Err(WebSocketError::ConnectionClosed) => Ok(()),
            other => other,
        }
    }

    async fn read_frame(&mut self) -> WebSocketResult<WebSocketFrame> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.read_buffer)? {
                return Ok(frame);
            }

            let read = tokio::select! {
                result = self.stream.read_buf(&mut self.read_buffer) => result?,
                _ = closed(&mut self.close_rx) => return Err(WebSocketError::ConnectionClosed),
            };

            if read == 0 {
                if self.read_buffer.is_empty() {
                    return Err(WebSocketError::ConnectionClosed);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed in the middle of a frame",
                )
                .into());
            }
        }
    }

    async fn flush_write_buffer(&mut self) -> WebSocketResult<()> {
        tokio::select! {
            result = write_flushed(&mut self.stream, &self.write_buffer) => Ok(result?),
            _ = closed(&mut self.close_rx) => Err(WebSocketError::ConnectionClosed),
        }
    }

    async fn ensure_open(&mut self) -> WebSocketResult<()> {
        if self.state == SocketState::Open && *self.close_signal.borrow() {
            self.teardown().await;
        }
        match self.state {
            SocketState::Open => Ok(()),
            SocketState::Closed => Err(WebSocketError::ConnectionClosed),
        }
    }

    async fn fail(&mut self, err: &WebSocketError) {
        let remote = self.remote();
        match err {
            WebSocketError::Protocol(e) => {
                warn!(remote = ?remote, error = %e, "WebSocket protocol violation");
                if self.config.close_on_protocol_error && !self.close_sent {
                    self.write_buffer.clear();
                    WebSocketFrame::new_close(Some(e.close_code()), None)
                        .encode(&mut self.write_buffer);
                    if let Err(e) = self.flush_write_buffer().await {
                        debug!(remote = ?remote, error = %e, "Failed to send close frame");
                    }
                    self.close_sent = true;
                }
            }
            WebSocketError::ConnectionClosed => {}
            _ => debug!(remote = ?remote, error = %err, "WebSocket connection failed"),
        }
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        if self.state == SocketState::Closed {
            return;
        }
        self.state = SocketState::Closed;
        self.close_signal.send_replace(true);
        if let Err(e) = self.stream.shutdown().await {
            debug!(remote = ?self.remote(), error = %e, "Failed to shut down stream");
        }
        debug!(remote = ?self.remote(), "WebSocket closed");
    }
}

impl<S> WebSocket<S> {
    /// Handle that can close this socket from another task.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            signal: Arc::clone(&self.close_signal),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SocketState {
        if *self.close_signal.borrow() {
            SocketState::Closed
        } else {
            self.state
        }
    }

    /// Whether the socket is closed or has been asked to close.
    pub fn is_closed(&self) -> bool {
        self.state() == SocketState::Closed
    }

    /// Headers of the request that was upgraded.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Peer addresses, when the host recorded them.
    pub fn socket_info(&self) -> Option<&SocketInfo> {
        self.socket_info.as_ref()
    }

    /// Configuration this socket runs with.
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    /// The underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Take back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    fn remote(&self) -> Option<std::net::SocketAddr> {
        self.socket_info.and_then(|info| info.remote)
    }
}

/// Longest prefix of `reason` that fits next to a status code.
fn truncate_reason(reason: &str) -> &str {
    let max = MAX_CONTROL_PAYLOAD as usize - 2;
    if reason.len() <= max {
        return reason;
    }
    let mut end = max;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

async fn write_flushed<S: AsyncWrite + Unpin>(stream: &mut S, data: &[u8]) -> io::Result<()> {
    stream.write_all(data).await?;
    stream.flush().await
}

/// Resolves once the close signal is raised.
async fn closed(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            // Sender lives as long as the socket
            std::future::pending::<()>().await;
        }
    }
}
