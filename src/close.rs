//! Close status codes and close frame payloads.
//!
//! A close payload is either empty or a big-endian status code followed by
//! an optional UTF-8 reason of at most [`MAX_CLOSE_REASON`] bytes.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frame::{FrameError, MAX_CLOSE_REASON};

/// Close status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// 1000: the purpose of the connection was fulfilled.
    Normal,
    /// 1001: an endpoint is going away, such as on idle timeout or shutdown.
    GoingAway,
    /// 1002: the peer violated the protocol.
    ProtocolError,
    /// 1003: the peer sent a data type that cannot be accepted.
    Unsupported,
    /// 1005: no status code was present. Never sent on the wire.
    NoStatus,
    /// 1006: the connection dropped without a close frame. Never sent on the
    /// wire.
    Abnormal,
    /// 1007: message data was inconsistent with its type.
    InvalidPayload,
    /// 1008: a message violated local policy.
    PolicyViolation,
    /// 1009: a message was too big to process.
    MessageTooBig,
    /// 1010: the client expected an extension the server did not negotiate.
    MandatoryExtension,
    /// 1011: the server hit an unexpected condition.
    UnexpectedCondition,
    /// 1015: TLS handshake failure. Never sent on the wire.
    TlsHandshake,
    /// Any other code, such as the 3000-4999 application ranges.
    Other(u16),
}

impl From<u16> for CloseCode {
    fn from(value: u16) -> Self {
        match value {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            1002 => Self::ProtocolError,
            1003 => Self::Unsupported,
            1005 => Self::NoStatus,
            1006 => Self::Abnormal,
            1007 => Self::InvalidPayload,
            1008 => Self::PolicyViolation,
            1009 => Self::MessageTooBig,
            1010 => Self::MandatoryExtension,
            1011 => Self::UnexpectedCondition,
            1015 => Self::TlsHandshake,
            other => Self::Other(other),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::NoStatus => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::UnexpectedCondition => 1011,
            CloseCode::TlsHandshake => 1015,
            CloseCode::Other(value) => value,
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u16::from(*self))
    }
}

impl CloseCode {
    /// Returns `true` if this code may appear in a close frame.
    #[must_use]
    pub fn is_sendable(self) -> bool {
        matches!(u16::from(self), 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

/// Decoded close frame payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReason {
    /// Status code sent by the peer.
    pub code: CloseCode,
    /// Optional human readable reason.
    pub reason: String,
}

/// Problems found in a received close payload.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CloseParseError {
    /// The payload held a single byte.
    #[error("close payload is one byte long")]
    Truncated,
    /// The status code may not be sent on the wire.
    #[error("close code {0} is not allowed on the wire")]
    InvalidCode(u16),
    /// The reason was not valid UTF-8.
    #[error("close reason is not valid UTF-8")]
    InvalidUtf8,
}

impl CloseParseError {
    /// Status the server should answer with.
    #[must_use]
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::InvalidUtf8 => CloseCode::InvalidPayload,
            Self::Truncated | Self::InvalidCode(_) => CloseCode::ProtocolError,
        }
    }
}

impl CloseReason {
    /// Build a reason, truncating `reason` to fit a control frame.
    #[must_use]
    pub fn new(code: CloseCode, reason: &str) -> Self {
        Self {
            code,
            reason: truncate_reason(reason).to_owned(),
        }
    }

    /// Parse a close payload. An empty payload carries no status.
    ///
    /// # Errors
    ///
    /// Returns a [`CloseParseError`] for a one byte payload, a status code
    /// that is not allowed on the wire, or a reason that is not UTF-8.
    pub fn parse(payload: &[u8]) -> Result<Option<Self>, CloseParseError> {
        match payload {
            [] => Ok(None),
            [_] => Err(CloseParseError::Truncated),
            [hi, lo, rest @ ..] => {
                let raw = u16::from_be_bytes([*hi, *lo]);
                let code = CloseCode::from(raw);
                if !code.is_sendable() {
                    return Err(CloseParseError::InvalidCode(raw));
                }
                let reason = std::str::from_utf8(rest)
                    .map_err(|_| CloseParseError::InvalidUtf8)?
                    .to_owned();
                Ok(Some(Self { code, reason }))
            }
        }
    }

    /// Encode as a close frame payload.
    #[must_use]
    pub fn encode(&self) -> Bytes { encode_close_payload(self.code, &self.reason) }
}

/// Longest prefix of `reason` that fits in a close frame without splitting
/// a character.
#[must_use]
pub fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

/// Encode `code` and `reason` as a close payload.
#[must_use]
pub fn encode_close_payload(code: CloseCode, reason: &str) -> Bytes {
    let reason = truncate_reason(reason);
    let mut buf = BytesMut::with_capacity(2 + reason.len());
    buf.put_u16(code.into());
    buf.put_slice(reason.as_bytes());
    buf.freeze()
}

/// Pick the status to send when the server closes.
///
/// An explicit `requested` status wins. Otherwise a reader failure maps to
/// its status and a clean connection closes with [`CloseCode::Normal`].
#[must_use]
pub fn resolve_status(requested: Option<CloseCode>, reader_error: Option<&FrameError>) -> CloseCode {
    requested.unwrap_or_else(|| reader_error.map_or(CloseCode::Normal, FrameError::close_code))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn parses_code_and_reason() {
        let parsed = CloseReason::parse(&[0x03, 0xE8, b'b', b'y', b'e']).expect("valid payload");
        assert_eq!(parsed, Some(CloseReason::new(CloseCode::Normal, "bye")));
    }

    #[test]
    fn empty_payload_has_no_status() {
        assert_eq!(CloseReason::parse(&[]), Ok(None));
    }

    #[rstest]
    #[case(&[0x03], CloseParseError::Truncated)]
    #[case(&[0x03, 0xED], CloseParseError::InvalidCode(1005))]
    #[case(&[0x03, 0xEE], CloseParseError::InvalidCode(1006))]
    #[case(&[0x00, 0x10], CloseParseError::InvalidCode(16))]
    #[case(&[0x03, 0xE8, 0xFF], CloseParseError::InvalidUtf8)]
    fn rejects_malformed_payloads(#[case] payload: &[u8], #[case] expected: CloseParseError) {
        assert_eq!(CloseReason::parse(payload), Err(expected));
    }

    #[test]
    fn application_codes_round_trip() {
        let reason = CloseReason::new(CloseCode::Other(4000), "app");
        assert_eq!(CloseReason::parse(&reason.encode()), Ok(Some(reason)));
    }

    #[test]
    fn long_reason_is_cut_on_char_boundary() {
        let reason = "é".repeat(100);
        let cut = truncate_reason(&reason);
        assert!(cut.len() <= MAX_CLOSE_REASON);
        assert_eq!(cut.len(), 122);
        assert_eq!(encode_close_payload(CloseCode::Normal, &reason).len(), 124);
    }

    #[rstest]
    #[case(None, None, CloseCode::Normal)]
    #[case(Some(CloseCode::PolicyViolation), None, CloseCode::PolicyViolation)]
    #[case(None, Some(FrameError::Oversized { size: 2000, max: 1024 }), CloseCode::MessageTooBig)]
    #[case(None, Some(FrameError::NotMasked), CloseCode::ProtocolError)]
    #[case(None, Some(FrameError::NoFrameReady), CloseCode::UnexpectedCondition)]
    #[case(
        Some(CloseCode::GoingAway),
        Some(FrameError::NotMasked),
        CloseCode::GoingAway
    )]
    fn status_resolution(
        #[case] requested: Option<CloseCode>,
        #[case] error: Option<FrameError>,
        #[case] expected: CloseCode,
    ) {
        assert_eq!(resolve_status(requested, error.as_ref()), expected);
    }
}
