//! WebSocket opening handshake per RFC 6455 Section 4.2.
//!
//! Once a request is known to be a WebSocket upgrade, the server answers with
//! a 101 response carrying `Sec-WebSocket-Accept`, derived from the client's
//! `Sec-WebSocket-Key`. After that the connection carries raw frames.

use std::io;

use base64::Engine;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use sha1::{Digest, Sha1};

use crate::error::HandshakeError;

/// WebSocket magic GUID for Sec-WebSocket-Accept calculation.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Status line of the raw handshake response.
pub const STATUS_LINE: &str = "HTTP/1.1 101 Web Socket Protocol Handshake";

/// Compute the `Sec-WebSocket-Accept` value for a client key.
///
/// ```
/// use http_websocket::handshake::accept_key;
///
/// assert_eq!(
///     accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Build the raw 101 response written straight onto a taken-over connection.
///
/// CRLF-terminated lines, a blank line, and no body.
pub fn response_bytes(accept: &str) -> Vec<u8> {
    format!(
        "{STATUS_LINE}\r\n\
         Upgrade: WebSocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\
         \r\n"
    )
    .into_bytes()
}

/// Whether the headers ask for a WebSocket upgrade.
///
/// The `Upgrade` header must name `websocket`, compared case-insensitively.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::UPGRADE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("websocket"))
}

/// Read the client's `Sec-WebSocket-Key`.
pub fn client_key(headers: &HeaderMap) -> Result<&str, HandshakeError> {
    headers
        .get(header::SEC_WEBSOCKET_KEY)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(HandshakeError::MissingKey)
}

/// Build the 101 response as an `http::Response`, for hosts that serialize
/// responses themselves before handing over the connection.
pub fn response(headers: &HeaderMap) -> Result<http::Response<()>, HandshakeError> {
    let accept = HeaderValue::from_str(&accept_key(client_key(headers)?))
        .map_err(|e| HandshakeError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;

    let mut response = http::Response::new(());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(header::UPGRADE, HeaderValue::from_static("WebSocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    Ok(response)
}

/// Build the response a host sends when an upgrade is refused.
pub fn reject(err: &HandshakeError) -> http::Response<String> {
    let mut response = http::Response::new(err.to_string());
    *response.status_mut() = err.status();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upgrade_headers(key: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        if let Some(key) = key {
            headers.insert(header::SEC_WEBSOCKET_KEY, HeaderValue::from_static(key));
        }
        headers
    }

    #[test]
    fn test_accept_key_rfc_vector() {
        // Test vector from RFC 6455
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_response_bytes_exact() {
        let response = response_bytes("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert_eq!(
            String::from_utf8(response).unwrap(),
            "HTTP/1.1 101 Web Socket Protocol Handshake\r\n\
             Upgrade: WebSocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
             \r\n"
        );
    }

    #[test]
    fn test_is_upgrade_request() {
        assert!(is_upgrade_request(&upgrade_headers(None)));

        let mut headers = HeaderMap::new();
        headers.insert(header::UPGRADE, HeaderValue::from_static("WebSocket"));
        assert!(is_upgrade_request(&headers));

        headers.insert(header::UPGRADE, HeaderValue::from_static("h2c"));
        assert!(!is_upgrade_request(&headers));

        assert!(!is_upgrade_request(&HeaderMap::new()));
    }

    #[test]
    fn test_client_key() {
        let headers = upgrade_headers(Some("dGhlIHNhbXBsZSBub25jZQ=="));
        assert_eq!(client_key(&headers).unwrap(), "dGhlIHNhbXBsZSBub25jZQ==");

        let headers = upgrade_headers(None);
        assert!(matches!(
            client_key(&headers),
            Err(HandshakeError::MissingKey)
        ));
    }

    #[test]
    fn test_http_response() {
        let headers = upgrade_headers(Some("dGhlIHNhbXBsZSBub25jZQ=="));
        let response = response(&headers).unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(response.headers()[header::UPGRADE], "WebSocket");
        assert_eq!(response.headers()[header::CONNECTION], "Upgrade");
        assert_eq!(
            response.headers()[header::SEC_WEBSOCKET_ACCEPT],
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_reject() {
        let response = reject(&HandshakeError::NotUpgrade);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body(), "Only support websocket protocol");
    }
}
