//! Extension types for reading upgrade information off `http::Request`

use std::net::SocketAddr;

use crate::{error::HandshakeError, handshake};

/// Socket information for an upgraded connection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SocketInfo {
    /// Local socket address
    pub local: Option<SocketAddr>,
    /// Remote socket address
    pub remote: Option<SocketAddr>,
}

impl SocketInfo {
    /// Create a new SocketInfo with both local and remote addresses
    pub fn new(local: Option<SocketAddr>, remote: Option<SocketAddr>) -> Self {
        Self { local, remote }
    }

    /// Create a SocketInfo with only remote address
    pub fn with_remote(remote: SocketAddr) -> Self {
        Self {
            local: None,
            remote: Some(remote),
        }
    }
}

/// Extension trait for http::Request
///
/// Gives the upgrade path access to the peer addresses the host recorded
/// and to the WebSocket-specific request headers.
pub trait RequestExt {
    /// Get socket info from request extensions
    fn socket_info(&self) -> Option<&SocketInfo>;

    /// Set socket info in request extensions
    fn set_socket_info(&mut self, info: SocketInfo);

    /// Whether the request carries `Upgrade: websocket`
    fn is_websocket_upgrade(&self) -> bool;

    /// The `Sec-WebSocket-Key` header value
    fn websocket_key(&self) -> Result<&str, HandshakeError>;
}

impl<T> RequestExt for http::Request<T> {
    fn socket_info(&self) -> Option<&SocketInfo> {
        self.extensions().get::<SocketInfo>()
    }

    fn set_socket_info(&mut self, info: SocketInfo) {
        self.extensions_mut().insert(info);
    }

    fn is_websocket_upgrade(&self) -> bool {
        handshake::is_upgrade_request(self.headers())
    }

    fn websocket_key(&self) -> Result<&str, HandshakeError> {
        handshake::client_key(self.headers())
    }
}

/// Extension trait for http::request::Builder
pub trait RequestBuilderExt {
    /// Set socket info in request builder
    fn socket_info(self, info: SocketInfo) -> http::request::Builder;
}

impl RequestBuilderExt for http::request::Builder {
    fn socket_info(self, info: SocketInfo) -> http::request::Builder {
        self.extension(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_socket_info() {
        let local = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);
        let remote = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), 5000);

        let info = SocketInfo::new(Some(local), Some(remote));
        assert_eq!(info.local, Some(local));
        assert_eq!(info.remote, Some(remote));

        let info = SocketInfo::with_remote(remote);
        assert_eq!(info.local, None);
        assert_eq!(info.remote, Some(remote));
    }

    #[test]
    fn test_request_ext() {
        let remote = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)), 41000);
        let mut request = http::Request::builder()
            .uri("/ws")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(())
            .unwrap();

        assert!(request.socket_info().is_none());
        request.set_socket_info(SocketInfo::with_remote(remote));
        assert_eq!(request.socket_info().unwrap().remote, Some(remote));

        assert!(request.is_websocket_upgrade());
        assert_eq!(request.websocket_key().unwrap(), "dGhlIHNhbXBsZSBub25jZQ==");
    }

    #[test]
    fn test_request_builder_ext() {
        let remote = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)), 41000);
        let request = http::Request::builder()
            .uri("/")
            .socket_info(SocketInfo::with_remote(remote))
            .body(())
            .unwrap();

        assert_eq!(request.socket_info().unwrap().remote, Some(remote));
        assert!(!request.is_websocket_upgrade());
        assert!(request.websocket_key().is_err());
    }
}
