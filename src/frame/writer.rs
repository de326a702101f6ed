//! Outbound frame queue with partial-write tracking.
//!
//! Each queued frame becomes a slot holding its encoded header and payload.
//! [`FrameWriter::write`] hands slot bytes to a non-blocking transport and
//! remembers how far it got, so a frame interrupted by back-pressure resumes
//! exactly where it stopped.

use std::{collections::VecDeque, io};

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Encoder;

use super::{CodecError, Frame, Opcode, header::put_header};
use crate::close::{CloseCode, encode_close_payload};

/// A transport that accepts bytes without blocking.
///
/// Implementations return [`io::ErrorKind::WouldBlock`] once the transport
/// cannot take more data.
pub trait NonBlockingWrite {
    /// Write some prefix of `buf`, returning how many bytes were taken.
    ///
    /// # Errors
    ///
    /// Returns `WouldBlock` under back-pressure and any other error on
    /// transport failure.
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl NonBlockingWrite for Vec<u8> {
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// Result of draining the queue into a transport.
#[derive(Debug)]
pub enum WriteResult {
    /// Every queued byte was written.
    Drained,
    /// The transport pushed back; bytes remain queued.
    Blocked,
    /// The transport failed; queued bytes are retained but should be
    /// considered lost.
    Error(io::Error),
}

#[derive(Debug)]
struct WriteSlot {
    header: Bytes,
    payload: Bytes,
}

impl WriteSlot {
    fn remaining(&self) -> usize { self.header.len() + self.payload.len() }

    fn chunk(&self) -> &[u8] {
        if self.header.is_empty() {
            &self.payload
        } else {
            &self.header
        }
    }

    fn advance(&mut self, mut n: usize) {
        let from_header = n.min(self.header.len());
        self.header.advance(from_header);
        n -= from_header;
        self.payload.advance(n);
    }
}

/// FIFO of encoded server frames awaiting transmission.
#[derive(Debug, Default)]
pub struct FrameWriter {
    slots: VecDeque<WriteSlot>,
    queued: usize,
}

impl FrameWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Returns `true` when nothing is waiting to be written.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    /// Total unwritten bytes, headers included.
    #[must_use]
    pub fn queued_bytes(&self) -> usize { self.queued }

    /// Number of frames with unwritten bytes.
    #[must_use]
    pub fn queued_frames(&self) -> usize { self.slots.len() }

    /// Queue a final, unmasked frame.
    ///
    /// Payload bytes are shared with the caller rather than copied.
    pub fn enqueue(&mut self, opcode: Opcode, payload: Bytes) {
        let mut header = BytesMut::new();
        put_header(&mut header, opcode, true, payload.len() as u64, None);
        let slot = WriteSlot {
            header: header.freeze(),
            payload,
        };
        self.queued += slot.remaining();
        self.slots.push_back(slot);
    }

    /// Queue a close frame carrying `code` and `reason`.
    ///
    /// The reason is cut to fit the control frame limit.
    pub fn enqueue_close(&mut self, code: CloseCode, reason: &str) {
        self.enqueue(Opcode::Close, encode_close_payload(code, reason));
    }

    /// Drop every queued frame.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.queued = 0;
    }

    /// Write queued bytes until the queue drains or `io` pushes back.
    ///
    /// A zero-length write is reported as [`io::ErrorKind::WriteZero`].
    pub fn write<T: NonBlockingWrite + ?Sized>(&mut self, io: &mut T) -> WriteResult {
        while let Some(slot) = self.slots.front_mut() {
            while slot.remaining() > 0 {
                match io.try_write(slot.chunk()) {
                    Ok(0) => return WriteResult::Error(io::ErrorKind::WriteZero.into()),
                    Ok(n) => {
                        slot.advance(n);
                        self.queued -= n;
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        return WriteResult::Blocked;
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return WriteResult::Error(e),
                }
            }
            self.slots.pop_front();
        }
        WriteResult::Drained
    }
}

impl Encoder<Frame> for FrameWriter {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        put_header(dst, frame.opcode, frame.fin, frame.payload.len() as u64, None);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}
