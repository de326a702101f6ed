//! Opening handshake helpers.
//!
//! The host HTTP server owns request parsing. These helpers check the two
//! WebSocket specific request headers and derive the response headers that
//! complete the upgrade.

use base64::Engine;
use sha1::{Digest, Sha1};
use thiserror::Error;

/// GUID appended to the client key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this engine accepts.
pub const SUPPORTED_VERSION: &str = "13";

/// Reasons an upgrade request is refused.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// `Sec-WebSocket-Version` is absent or not `13`.
    ///
    /// Answer with `400 Bad Request` and `Sec-WebSocket-Version: 13`.
    #[error("unsupported websocket version: {0:?}")]
    UnsupportedVersion(Option<String>),
    /// `Sec-WebSocket-Key` is absent.
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
    /// `Sec-WebSocket-Key` is not base64 for 16 bytes.
    #[error("invalid Sec-WebSocket-Key: {0}")]
    InvalidKey(String),
}

/// Derive `Sec-WebSocket-Accept` from the client's key.
///
/// ```
/// use wsengine::handshake::accept_key;
/// assert_eq!(
///     accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
#[must_use]
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Check the version and key headers, returning the accept key.
///
/// # Errors
///
/// Returns [`HandshakeError`] when the version is not `13` or the key is
/// missing or malformed.
pub fn validate_request(version: Option<&str>, key: Option<&str>) -> Result<String, HandshakeError> {
    let version = version.map(str::trim);
    if version != Some(SUPPORTED_VERSION) {
        return Err(HandshakeError::UnsupportedVersion(version.map(str::to_owned)));
    }
    let key = key.map(str::trim).ok_or(HandshakeError::MissingKey)?;
    match base64::engine::general_purpose::STANDARD.decode(key) {
        Ok(raw) if raw.len() == 16 => Ok(accept_key(key)),
        _ => Err(HandshakeError::InvalidKey(key.to_owned())),
    }
}

/// Headers a `101 Switching Protocols` response must carry.
#[must_use]
pub fn response_headers(accept: &str) -> [(&'static str, String); 3] {
    [
        ("Upgrade", "websocket".to_owned()),
        ("Connection", "Upgrade".to_owned()),
        ("Sec-WebSocket-Accept", accept.to_owned()),
    ]
}

/// Complete HTTP/1.1 response accepting the upgrade.
#[must_use]
pub fn switching_protocols_response(accept: &str) -> String {
    let mut response = String::from("HTTP/1.1 101 Switching Protocols\r\n");
    for (name, value) in response_headers(accept) {
        response.push_str(name);
        response.push_str(": ");
        response.push_str(&value);
        response.push_str("\r\n");
    }
    response.push_str("\r\n");
    response
}

/// Complete HTTP/1.1 response refusing the upgrade.
#[must_use]
pub fn rejection_response(error: &HandshakeError) -> String {
    let mut response = String::from("HTTP/1.1 400 Bad Request\r\n");
    if matches!(error, HandshakeError::UnsupportedVersion(_)) {
        response.push_str("Sec-WebSocket-Version: ");
        response.push_str(SUPPORTED_VERSION);
        response.push_str("\r\n");
    }
    response.push_str("Content-Length: 0\r\n\r\n");
    response
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    #[test]
    fn accepts_valid_request() {
        assert_eq!(
            validate_request(Some("13"), Some(SAMPLE_KEY)),
            Ok("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=".to_owned())
        );
    }

    #[rstest]
    #[case(None, Some(SAMPLE_KEY), HandshakeError::UnsupportedVersion(None))]
    #[case(Some("8"), Some(SAMPLE_KEY), HandshakeError::UnsupportedVersion(Some("8".into())))]
    #[case(Some("13"), None, HandshakeError::MissingKey)]
    #[case(Some("13"), Some("c2hvcnQ="), HandshakeError::InvalidKey("c2hvcnQ=".into()))]
    #[case(Some("13"), Some("not base64!"), HandshakeError::InvalidKey("not base64!".into()))]
    fn rejects_bad_requests(
        #[case] version: Option<&str>,
        #[case] key: Option<&str>,
        #[case] expected: HandshakeError,
    ) {
        assert_eq!(validate_request(version, key), Err(expected));
    }

    #[test]
    fn version_rejection_advertises_supported_version() {
        let response = rejection_response(&HandshakeError::UnsupportedVersion(None));
        assert!(response.starts_with("HTTP/1.1 400"));
        assert!(response.contains("Sec-WebSocket-Version: 13\r\n"));
    }

    #[test]
    fn upgrade_response_carries_accept_key() {
        let response = switching_protocols_response("abc=");
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: abc=\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }
}
