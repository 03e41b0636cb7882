//! Echo server: upgrades connections on any path, logs each text message and
//! sends it back.
//!
//! ```text
//! RUST_LOG=debug cargo run --example echo_server -- 127.0.0.1:8080
//! ```

use std::io;

use bytes::BytesMut;
use http_websocket::{
    Message, RequestBuilderExt, SocketInfo, WebSocketConfig, WebSocketError, acceptor, handshake,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const MAX_HEAD: usize = 8192;
const MAX_HEADERS: usize = 64;

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "server listening");

    let (upgrader, mut acceptor) = acceptor::channel::<TcpStream>(WebSocketConfig::default());

    tokio::spawn(async move {
        loop {
            let mut socket = match acceptor.accept().await {
                Ok(socket) => socket,
                Err(e) if e.is_end_of_stream() => break,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            };

            tokio::spawn(async move {
                loop {
                    match socket.receive_message().await {
                        Ok(Message::Text(text)) => {
                            info!(text = %text, "received");
                            if let Err(e) = socket.send_message(text).await {
                                warn!(error = %e, "send failed");
                                break;
                            }
                        }
                        Ok(Message::Binary(data)) => {
                            if let Err(e) = socket.send_message(data).await {
                                warn!(error = %e, "send failed");
                                break;
                            }
                        }
                        Ok(Message::Close(_)) | Err(WebSocketError::ConnectionClosed) => break,
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "receive failed");
                            break;
                        }
                    }
                }
                let _ = socket.close().await;
            });
        }
    });

    loop {
        let (stream, remote) = listener.accept().await?;
        let upgrader = upgrader.clone();
        tokio::spawn(async move {
            if let Err(e) = serve(stream, remote, upgrader).await {
                warn!(remote = %remote, error = %e, "connection failed");
            }
        });
    }
}

async fn serve(
    mut stream: TcpStream,
    remote: std::net::SocketAddr,
    upgrader: acceptor::Upgrader<TcpStream>,
) -> io::Result<()> {
    let request = read_request(&mut stream)
        .await?
        .socket_info(SocketInfo::new(stream.local_addr().ok(), Some(remote)))
        .body(())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if !handshake::is_upgrade_request(request.headers()) {
        let err = http_websocket::HandshakeError::NotUpgrade;
        let response = handshake::reject(&err);
        let raw = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            response.status(),
            response.body().len(),
            response.body()
        );
        stream.write_all(raw.as_bytes()).await?;
        return stream.shutdown().await;
    }

    upgrader
        .upgrade(&request, stream)
        .await
        .map_err(|e| io::Error::other(e.to_string()))
}

/// Read until a complete request head has arrived.
async fn read_request(stream: &mut TcpStream) -> io::Result<http::request::Builder> {
    let mut buffer = BytesMut::with_capacity(1024);
    loop {
        if stream.read_buf(&mut buffer).await? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        if let Some(builder) = parse_head(&buffer)? {
            return Ok(builder);
        }
        if buffer.len() >= MAX_HEAD {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "request head too large",
            ));
        }
    }
}

/// `None` while the head is still incomplete.
fn parse_head(data: &[u8]) -> io::Result<Option<http::request::Builder>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);

    match request.parse(data) {
        Ok(httparse::Status::Complete(_)) => {
            let mut builder = http::Request::builder()
                .method(request.method.unwrap_or("GET"))
                .uri(request.path.unwrap_or("/"));
            for header in request.headers.iter() {
                builder = builder.header(header.name, header.value);
            }
            Ok(Some(builder))
        }
        Ok(httparse::Status::Partial) => Ok(None),
        Err(e) => Err(io::Error::new(io::ErrorKind::InvalidData, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_websocket::RequestExt;

    const UPGRADE: &[u8] = b"GET /chat HTTP/1.1\r\n\
        Host: localhost:8080\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\r\n";

    #[test]
    fn test_parse_upgrade_head() {
        let request = parse_head(UPGRADE).unwrap().unwrap().body(()).unwrap();
        assert_eq!(request.method(), http::Method::GET);
        assert_eq!(request.uri(), "/chat");
        assert!(request.is_websocket_upgrade());
        assert_eq!(request.websocket_key().unwrap(), "dGhlIHNhbXBsZSBub25jZQ==");
    }

    #[test]
    fn test_parse_partial_head() {
        assert!(parse_head(&UPGRADE[..UPGRADE.len() - 2]).unwrap().is_none());
        assert!(parse_head(b"GET / HTTP/1.1\r\nHost: x").unwrap().is_none());
    }

    #[test]
    fn test_parse_invalid_head() {
        let err = parse_head(b"GET / HTTP/1.1\r\nBad Header\r\n\r\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
