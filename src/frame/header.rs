//! Header layout helpers shared by the reader and writer.

use bytes::{BufMut, BytesMut};

use super::Opcode;

/// FIN bit in the first header byte.
pub const FIN_BIT: u8 = 0x80;
/// RSV1, RSV2 and RSV3 bits in the first header byte.
pub const RSV_BITS: u8 = 0x70;
/// Opcode nibble in the first header byte.
pub const OPCODE_MASK: u8 = 0x0F;
/// MASK bit in the second header byte.
pub const MASK_BIT: u8 = 0x80;
/// Seven bit length field in the second header byte.
pub const LEN_MASK: u8 = 0x7F;

/// Seven bit marker announcing a 16-bit extended length.
pub const LEN_16_MARKER: u8 = 126;
/// Seven bit marker announcing a 64-bit extended length.
pub const LEN_64_MARKER: u8 = 127;

/// Longest possible unmasked server header: 2 fixed bytes plus 8 length bytes.
pub const MAX_HEADER_LEN: usize = 10;

/// Number of extended length bytes that follow the fixed header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LengthWidth {
    /// Length fits in the seven bit field.
    Inline,
    /// Two big-endian bytes follow.
    Short,
    /// Eight big-endian bytes follow.
    Long,
}

impl LengthWidth {
    /// Choose the minimal encoding for `len`.
    #[must_use]
    pub fn for_len(len: u64) -> Self {
        if len <= 125 {
            Self::Inline
        } else if len <= u64::from(u16::MAX) {
            Self::Short
        } else {
            Self::Long
        }
    }

    /// Width selected by the seven bit length field.
    #[must_use]
    pub fn from_marker(len7: u8) -> Self {
        match len7 {
            LEN_16_MARKER => Self::Short,
            LEN_64_MARKER => Self::Long,
            _ => Self::Inline,
        }
    }

    /// Extended length bytes carried on the wire.
    #[must_use]
    pub fn extra_bytes(self) -> usize {
        match self {
            Self::Inline => 0,
            Self::Short => 2,
            Self::Long => 8,
        }
    }
}

/// Total header size for a frame carrying `len` payload bytes.
#[must_use]
pub fn header_len(len: u64, masked: bool) -> usize {
    2 + LengthWidth::for_len(len).extra_bytes() + if masked { 4 } else { 0 }
}

/// Append a final-fragment header for `opcode` and `len` to `dst`.
///
/// The length uses the shortest encoding. When `mask` is provided the MASK
/// bit is set and the key follows the length.
pub fn put_header(dst: &mut BytesMut, opcode: Opcode, fin: bool, len: u64, mask: Option<[u8; 4]>) {
    let first = if fin { FIN_BIT } else { 0 } | opcode.as_u8();
    let mask_bit = if mask.is_some() { MASK_BIT } else { 0 };
    dst.reserve(header_len(len, mask.is_some()));
    dst.put_u8(first);
    match LengthWidth::for_len(len) {
        LengthWidth::Inline => {
            #[expect(clippy::cast_possible_truncation, reason = "len is at most 125")]
            dst.put_u8(mask_bit | len as u8);
        }
        LengthWidth::Short => {
            dst.put_u8(mask_bit | LEN_16_MARKER);
            #[expect(clippy::cast_possible_truncation, reason = "len fits in u16")]
            dst.put_u16(len as u16);
        }
        LengthWidth::Long => {
            dst.put_u8(mask_bit | LEN_64_MARKER);
            dst.put_u64(len);
        }
    }
    if let Some(key) = mask {
        dst.put_slice(&key);
    }
}
