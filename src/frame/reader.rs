//! Incremental frame decoder.
//!
//! The reader consumes bytes from a caller-owned [`BytesMut`] and walks a
//! small state machine: fixed header, optional extended length, optional
//! masking key, then payload. Bytes that belong to a stage which cannot yet
//! complete are left in the caller's buffer untouched.
//!
//! Control frames may arrive between the fragments of a data message. Their
//! payloads are collected separately so the message in flight is preserved.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use super::{
    CodecError,
    Frame,
    FrameError,
    MAX_CONTROL_PAYLOAD,
    Message,
    Opcode,
    Role,
    apply_mask,
    header::{FIN_BIT, LEN_MASK, LengthWidth, MASK_BIT, OPCODE_MASK, RSV_BITS},
};

/// Default limit on a reassembled data message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024;

/// Outcome of a call to [`FrameReader::feed`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameEvent {
    /// The buffer ran out before a frame or message completed.
    NeedMore,
    /// A control frame is ready. Call [`FrameReader::pop_frame`] before
    /// feeding more input.
    ControlReady(Frame),
    /// A data message is complete. Call [`FrameReader::pop_frame`] before
    /// feeding more input.
    MessageReady(Message),
    /// The input violated the protocol; the reader is now failed.
    ProtocolError(FrameError),
}

/// Item produced by the [`Decoder`] implementation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A `Close`, `Ping` or `Pong` frame.
    Control(Frame),
    /// A complete `Text` or `Binary` message.
    Message(Message),
}

#[derive(Clone, Copy, Debug)]
struct Head {
    fin: bool,
    opcode: Opcode,
    masked: bool,
}

#[derive(Clone, Debug)]
enum Stage {
    Header,
    Length {
        head: Head,
        width: LengthWidth,
    },
    Mask {
        head: Head,
        len: usize,
    },
    Payload {
        head: Head,
        mask: Option<[u8; 4]>,
        len: usize,
        received: usize,
    },
    Ready {
        control: bool,
    },
    Failed(FrameError),
}

enum Progress {
    Stage(Stage),
    NeedMore,
    Ready(FrameEvent),
}

/// Stateful decoder for one direction of a WebSocket connection.
///
/// ```
/// use bytes::BytesMut;
/// use wsengine::frame::{FrameEvent, FrameReader, Opcode, Role};
///
/// let mut reader = FrameReader::new(Role::Client, 1024);
/// let mut buf = BytesMut::from(&b"\x81\x02hi"[..]);
/// match reader.feed(&mut buf) {
///     FrameEvent::MessageReady(msg) => {
///         assert_eq!(msg.opcode, Opcode::Text);
///         assert_eq!(&msg.payload[..], b"hi");
///     }
///     other => panic!("unexpected event: {other:?}"),
/// }
/// reader.pop_frame().expect("frame ready");
/// ```
#[derive(Debug)]
pub struct FrameReader {
    role: Role,
    max_size: usize,
    stage: Stage,
    message_opcode: Option<Opcode>,
    message: BytesMut,
    control: BytesMut,
}

impl Default for FrameReader {
    fn default() -> Self { Self::new(Role::Server, DEFAULT_MAX_MESSAGE_SIZE) }
}

impl FrameReader {
    /// Create a reader for `role` that rejects messages above `max_size`.
    #[must_use]
    pub fn new(role: Role, max_size: usize) -> Self {
        Self {
            role,
            max_size,
            stage: Stage::Header,
            message_opcode: None,
            message: BytesMut::new(),
            control: BytesMut::with_capacity(MAX_CONTROL_PAYLOAD),
        }
    }

    /// Role this reader decodes for.
    #[must_use]
    pub fn role(&self) -> Role { self.role }

    /// Current message size limit.
    #[must_use]
    pub fn max_size(&self) -> usize { self.max_size }

    /// Change the message size limit. Takes effect from the next header.
    pub fn set_max_size(&mut self, max_size: usize) { self.max_size = max_size; }

    /// Error that failed the reader, if any.
    #[must_use]
    pub fn error(&self) -> Option<&FrameError> {
        match &self.stage {
            Stage::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Returns `true` while a fragmented data message is being collected.
    #[must_use]
    pub fn has_partial_message(&self) -> bool { self.message_opcode.is_some() }

    /// Bytes the current stage needs before it can complete.
    ///
    /// This counts from the start of the stage, so bytes already sitting in
    /// the caller's buffer count toward it. Returns `0` when a frame is
    /// ready or the reader has failed.
    #[must_use]
    pub fn required_bytes(&self) -> usize {
        match &self.stage {
            Stage::Header => 2,
            Stage::Length { width, .. } => width.extra_bytes(),
            Stage::Mask { .. } => 4,
            Stage::Payload { len, received, .. } => len - received,
            Stage::Ready { .. } | Stage::Failed(_) => 0,
        }
    }

    /// Consume bytes from `src` until a control frame or a complete message
    /// is ready, more input is needed, or the input is rejected.
    ///
    /// Only the bytes of the frame being decoded are consumed; anything after
    /// a ready frame stays in `src` for the next call.
    pub fn feed(&mut self, src: &mut BytesMut) -> FrameEvent {
        loop {
            let progress = match self.stage {
                Stage::Header => self.read_header(src),
                Stage::Length { head, width } => self.read_length(src, head, width),
                Stage::Mask { head, len } => Ok(Self::read_mask(src, head, len)),
                Stage::Payload {
                    head,
                    mask,
                    len,
                    received,
                } => self.read_payload(src, head, mask, len, received),
                Stage::Ready { .. } => Err(FrameError::FramePending),
                Stage::Failed(ref err) => return FrameEvent::ProtocolError(err.clone()),
            };
            match progress {
                Ok(Progress::Stage(next)) => self.stage = next,
                Ok(Progress::NeedMore) => return FrameEvent::NeedMore,
                Ok(Progress::Ready(event)) => return event,
                Err(err) => {
                    self.stage = Stage::Failed(err.clone());
                    return FrameEvent::ProtocolError(err);
                }
            }
        }
    }

    /// Release the ready frame so decoding can continue.
    ///
    /// After a control frame any data message in progress is kept. After a
    /// complete message the reader returns to its initial state.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::NoFrameReady`] and fails the reader when no frame
    /// is ready, or the stored error when the reader has already failed.
    pub fn pop_frame(&mut self) -> Result<(), FrameError> {
        match self.stage {
            Stage::Ready { control } => {
                if !control {
                    self.message_opcode = None;
                }
                self.stage = Stage::Header;
                Ok(())
            }
            Stage::Failed(ref err) => Err(err.clone()),
            _ => {
                self.stage = Stage::Failed(FrameError::NoFrameReady);
                Err(FrameError::NoFrameReady)
            }
        }
    }

    /// Discard all decoding state, including a failure or a partial message.
    pub fn clear(&mut self) {
        self.stage = Stage::Header;
        self.message_opcode = None;
        self.message.clear();
        self.control.clear();
    }

    fn read_header(&mut self, src: &mut BytesMut) -> Result<Progress, FrameError> {
        if src.len() < 2 {
            return Ok(Progress::NeedMore);
        }
        let (b0, b1) = (src[0], src[1]);

        let rsv = b0 & RSV_BITS;
        if rsv != 0 {
            return Err(FrameError::ReservedBits(rsv >> 4));
        }
        let raw_opcode = b0 & OPCODE_MASK;
        let opcode = Opcode::from_u8(raw_opcode).ok_or(FrameError::UnknownOpcode(raw_opcode))?;
        let fin = b0 & FIN_BIT != 0;
        let masked = b1 & MASK_BIT != 0;
        let len7 = b1 & LEN_MASK;

        match (self.role, masked) {
            (Role::Server, false) => return Err(FrameError::NotMasked),
            (Role::Client, true) => return Err(FrameError::UnexpectedMask),
            _ => {}
        }

        if opcode.is_control() {
            if !fin {
                return Err(FrameError::FragmentedControl);
            }
            if usize::from(len7) > MAX_CONTROL_PAYLOAD {
                return Err(FrameError::ControlTooLong(u64::from(len7)));
            }
        } else if opcode == Opcode::Continuation {
            if self.message_opcode.is_none() {
                return Err(FrameError::UnexpectedContinuation);
            }
        } else if self.message_opcode.is_some() {
            return Err(FrameError::InterleavedMessage);
        }

        src.advance(2);
        let head = Head {
            fin,
            opcode,
            masked,
        };
        match LengthWidth::from_marker(len7) {
            LengthWidth::Inline => self.accept_length(head, u64::from(len7)),
            width => Ok(Progress::Stage(Stage::Length { head, width })),
        }
    }

    fn read_length(
        &mut self,
        src: &mut BytesMut,
        head: Head,
        width: LengthWidth,
    ) -> Result<Progress, FrameError> {
        if src.len() < width.extra_bytes() {
            return Ok(Progress::NeedMore);
        }
        let len = match width {
            LengthWidth::Short => u64::from(src.get_u16()),
            _ => src.get_u64(),
        };
        if len >> 63 != 0 {
            return Err(FrameError::InvalidLength);
        }
        self.accept_length(head, len)
    }

    fn accept_length(&mut self, head: Head, len: u64) -> Result<Progress, FrameError> {
        let oversized = |size| FrameError::Oversized {
            size,
            max: self.max_size,
        };
        if head.opcode.is_control() {
            if len > MAX_CONTROL_PAYLOAD as u64 {
                return Err(FrameError::ControlTooLong(len));
            }
        } else {
            let total = (self.message.len() as u64).saturating_add(len);
            if total > self.max_size as u64 {
                return Err(oversized(total));
            }
        }
        let len = usize::try_from(len).map_err(|_| oversized(len))?;

        if head.opcode.is_data() {
            if head.opcode != Opcode::Continuation {
                self.message_opcode = Some(head.opcode);
            }
            self.message.reserve(len);
        }

        Ok(Progress::Stage(if head.masked {
            Stage::Mask { head, len }
        } else {
            Stage::Payload {
                head,
                mask: None,
                len,
                received: 0,
            }
        }))
    }

    fn read_mask(src: &mut BytesMut, head: Head, len: usize) -> Progress {
        if src.len() < 4 {
            return Progress::NeedMore;
        }
        let key = [src[0], src[1], src[2], src[3]];
        src.advance(4);
        Progress::Stage(Stage::Payload {
            head,
            mask: Some(key),
            len,
            received: 0,
        })
    }

    fn read_payload(
        &mut self,
        src: &mut BytesMut,
        head: Head,
        mask: Option<[u8; 4]>,
        len: usize,
        received: usize,
    ) -> Result<Progress, FrameError> {
        let take = (len - received).min(src.len());
        if take > 0 {
            let mut chunk = src.split_to(take);
            if let Some(key) = mask {
                apply_mask(&mut chunk, key, received);
            }
            let target = if head.opcode.is_control() {
                &mut self.control
            } else {
                &mut self.message
            };
            target.extend_from_slice(&chunk);
        }

        let received = received + take;
        if received < len {
            self.stage = Stage::Payload {
                head,
                mask,
                len,
                received,
            };
            return Ok(Progress::NeedMore);
        }

        if head.opcode.is_control() {
            self.stage = Stage::Ready { control: true };
            return Ok(Progress::Ready(FrameEvent::ControlReady(Frame {
                fin: true,
                opcode: head.opcode,
                mask,
                payload: self.control.split().freeze(),
            })));
        }
        if !head.fin {
            return Ok(Progress::Stage(Stage::Header));
        }
        let opcode = self
            .message_opcode
            .ok_or(FrameError::UnexpectedContinuation)?;
        self.stage = Stage::Ready { control: false };
        Ok(Progress::Ready(FrameEvent::MessageReady(Message {
            opcode,
            payload: self.message.split().freeze(),
        })))
    }
}

impl Decoder for FrameReader {
    type Item = Inbound;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let item = match self.feed(src) {
            FrameEvent::NeedMore => return Ok(None),
            FrameEvent::ControlReady(frame) => Inbound::Control(frame),
            FrameEvent::MessageReady(message) => Inbound::Message(message),
            FrameEvent::ProtocolError(err) => return Err(err.into()),
        };
        self.pop_frame()?;
        Ok(Some(item))
    }
}
