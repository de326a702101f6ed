//! Error types for frame decoding.
//!
//! [`FrameError`] covers everything the reader can reject on the wire plus
//! misuse of the reader API. [`CodecError`] adds transport failures so the
//! reader and writer can serve as `tokio_util` codecs.

use std::io;

use thiserror::Error;

use crate::close::CloseCode;

/// Reasons a [`FrameReader`](super::FrameReader) refuses its input.
///
/// Once returned, the reader stays failed until cleared.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// One of the RSV1-3 bits is set but no extension was negotiated.
    #[error("reserved header bits set: {0:#05b}")]
    ReservedBits(u8),

    /// Opcode nibble is one of the reserved values.
    #[error("unknown opcode {0:#x}")]
    UnknownOpcode(u8),

    /// A client frame arrived without a masking key.
    #[error("client frame is not masked")]
    NotMasked,

    /// A server frame arrived with a masking key.
    #[error("server frame must not be masked")]
    UnexpectedMask,

    /// A control frame arrived with the FIN bit clear.
    #[error("control frame is fragmented")]
    FragmentedControl,

    /// A control frame declared a payload above 125 bytes.
    #[error("control frame payload too long: {0} > 125")]
    ControlTooLong(u64),

    /// A continuation frame arrived with no message in progress.
    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,

    /// A new data message started before the previous one finished.
    #[error("new data frame while a fragmented message is in progress")]
    InterleavedMessage,

    /// The 64-bit extended length had its most significant bit set.
    #[error("invalid payload length encoding")]
    InvalidLength,

    /// The frame or the reassembled message would exceed the size limit.
    #[error("message exceeds max size: {size} > {max}")]
    Oversized {
        /// Declared or accumulated size in bytes.
        size: u64,
        /// Configured maximum.
        max: usize,
    },

    /// Input was fed while a ready frame had not been popped.
    #[error("previous frame was not popped before feeding more input")]
    FramePending,

    /// `pop_frame` was called with no ready frame.
    #[error("no frame is ready to pop")]
    NoFrameReady,
}

impl FrameError {
    /// Close status a server should send after this error.
    ///
    /// Size violations map to `MessageTooBig`, reader misuse is an internal
    /// fault and every other case is a peer protocol violation.
    #[must_use]
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::Oversized { .. } => CloseCode::MessageTooBig,
            Self::FramePending | Self::NoFrameReady => CloseCode::UnexpectedCondition,
            _ => CloseCode::ProtocolError,
        }
    }
}

/// Error type used by the `Decoder` and `Encoder` implementations.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The input violated the framing protocol.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}
