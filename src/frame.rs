//! WebSocket frame model, incremental decoding and queued encoding.
//!
//! [`FrameReader`] turns inbound bytes into control frames and complete
//! data messages, while [`FrameWriter`] holds outbound frames until the
//! transport can accept them. Both sides speak the RFC 6455 base framing
//! protocol without extensions.

pub mod error;
pub mod header;
pub mod reader;
pub mod writer;

use bytes::Bytes;
pub use error::{CodecError, FrameError};
pub use reader::{FrameEvent, FrameReader, Inbound};
use static_assertions::const_assert;
pub use writer::{FrameWriter, NonBlockingWrite, WriteResult};

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Largest close reason that fits alongside the two byte status code.
pub const MAX_CLOSE_REASON: usize = MAX_CONTROL_PAYLOAD - 2;

const_assert!(MAX_CLOSE_REASON == 123);

/// Frame opcode as carried in the low nibble of the first header byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Continuation of a fragmented data message.
    Continuation,
    /// UTF-8 text data.
    Text,
    /// Binary data.
    Binary,
    /// Connection close.
    Close,
    /// Ping.
    Ping,
    /// Pong.
    Pong,
}

impl Opcode {
    /// Decode an opcode nibble, returning `None` for reserved values.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// Wire value of this opcode.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    /// Returns `true` for `Close`, `Ping` and `Pong`.
    #[must_use]
    pub fn is_control(self) -> bool { self.as_u8() & 0x8 != 0 }

    /// Returns `true` for `Continuation`, `Text` and `Binary`.
    #[must_use]
    pub fn is_data(self) -> bool { !self.is_control() }
}

/// Which end of the connection a [`FrameReader`] decodes for.
///
/// Frames sent by a client must be masked and frames sent by a server must
/// not be, so the reader checks the mask bit against its role.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Role {
    /// Decode client-to-server traffic. Every frame must be masked.
    #[default]
    Server,
    /// Decode server-to-client traffic. No frame may be masked.
    Client,
}

/// A single decoded frame with its payload already unmasked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Masking key seen on the wire, if any.
    pub mask: Option<[u8; 4]>,
    /// Unmasked payload.
    pub payload: Bytes,
}

impl Frame {
    /// Build a final, unmasked frame.
    #[must_use]
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    /// Build a text frame.
    #[must_use]
    pub fn text(payload: impl Into<Bytes>) -> Self { Self::new(Opcode::Text, payload) }

    /// Build a binary frame.
    #[must_use]
    pub fn binary(payload: impl Into<Bytes>) -> Self { Self::new(Opcode::Binary, payload) }

    /// Build a ping frame.
    #[must_use]
    pub fn ping(payload: impl Into<Bytes>) -> Self { Self::new(Opcode::Ping, payload) }

    /// Build a pong frame.
    #[must_use]
    pub fn pong(payload: impl Into<Bytes>) -> Self { Self::new(Opcode::Pong, payload) }
}

/// A complete data message reassembled from one or more fragments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Opcode of the first fragment, either `Text` or `Binary`.
    pub opcode: Opcode,
    /// Concatenated, unmasked payload of every fragment.
    pub payload: Bytes,
}

/// XOR `buf` with `key`, treating `offset` as the position of `buf[0]`
/// within the frame payload.
///
/// Masking is its own inverse, so the same call unmasks.
pub fn apply_mask(buf: &mut [u8], key: [u8; 4], offset: usize) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= key[(offset + i) % 4];
    }
}
