//! A minimal WebSocket client for driving the server side under test.

use std::{io, time::Duration};

use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use tokio::{
    io::AsyncWriteExt,
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::timeout,
};
use tokio_util::codec::FramedRead;
use wsengine::frame::{CodecError, Frame, FrameReader, Inbound, Opcode, Role, apply_mask};

/// Masking key from the RFC 6455 examples.
pub const TEST_MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

const READ_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_SERVER_MESSAGE: usize = 16 * 1024 * 1024;

/// Encode a single client frame with the given flags, masked with `mask`.
///
/// No validation is applied, so tests can build frames a conforming client
/// would never send.
#[must_use]
pub fn encode_client_frame(opcode: u8, fin: bool, payload: &[u8], mask: Option<[u8; 4]>) -> Bytes {
    let mut out = BytesMut::with_capacity(payload.len() + 14);
    let fin_bit = if fin { 0x80 } else { 0 };
    out.put_u8(fin_bit | (opcode & 0x0f));
    let mask_bit = if mask.is_some() { 0x80 } else { 0 };
    match payload.len() {
        len @ 0..=125 => out.put_u8(mask_bit | u8::try_from(len).unwrap_or(125)),
        len if u16::try_from(len).is_ok() => {
            out.put_u8(mask_bit | 126);
            out.put_u16(u16::try_from(len).unwrap_or(u16::MAX));
        }
        len => {
            out.put_u8(mask_bit | 127);
            out.put_u64(len as u64);
        }
    }
    let start = out.len();
    out.put_slice(payload);
    if let Some(key) = mask {
        out.put_slice(&key);
        // Key goes before the payload on the wire.
        out[start..].rotate_right(4);
        apply_mask(&mut out[start + 4..], key, 0);
    }
    out.freeze()
}

/// Client end of a loopback connection.
///
/// Writes masked frames and decodes unmasked server frames with a
/// [`FrameReader`] in the client role.
pub struct TestClient {
    frames: FramedRead<OwnedReadHalf, FrameReader>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    /// Wrap a connected client socket.
    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        let (read, writer) = stream.into_split();
        Self {
            frames: FramedRead::new(read, FrameReader::new(Role::Client, MAX_SERVER_MESSAGE)),
            writer,
        }
    }

    /// Write raw bytes to the server.
    ///
    /// # Errors
    ///
    /// Propagates socket write errors.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes).await
    }

    /// Send one masked frame.
    ///
    /// # Errors
    ///
    /// Propagates socket write errors.
    pub async fn send_frame(&mut self, opcode: Opcode, fin: bool, payload: &[u8]) -> io::Result<()> {
        let bytes = encode_client_frame(opcode.as_u8(), fin, payload, Some(TEST_MASK));
        self.send_raw(&bytes).await
    }

    /// Send a complete text message.
    ///
    /// # Errors
    ///
    /// Propagates socket write errors.
    pub async fn send_text(&mut self, text: &str) -> io::Result<()> {
        self.send_frame(Opcode::Text, true, text.as_bytes()).await
    }

    /// Send a close frame carrying `code` and `reason`.
    ///
    /// # Errors
    ///
    /// Propagates socket write errors.
    pub async fn send_close(&mut self, code: u16, reason: &str) -> io::Result<()> {
        let mut payload = code.to_be_bytes().to_vec();
        payload.extend_from_slice(reason.as_bytes());
        self.send_frame(Opcode::Close, true, &payload).await
    }

    /// Shut down the write half, signalling end of stream to the server.
    ///
    /// # Errors
    ///
    /// Propagates socket errors.
    pub async fn shutdown(&mut self) -> io::Result<()> { self.writer.shutdown().await }

    /// Next control frame or message from the server.
    ///
    /// Returns `None` once the server closes the socket.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::TimedOut`] if nothing arrives in time, or
    /// the decoding error for malformed server output.
    pub async fn next(&mut self) -> io::Result<Option<Inbound>> {
        match timeout(READ_TIMEOUT, self.frames.next()).await {
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "no frame from server")),
            Ok(None) => Ok(None),
            Ok(Some(item)) => item.map(Some).map_err(into_io),
        }
    }

    /// Write `frame` back to back until the server sends a data message,
    /// then return that message. Control frames from the server are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::TimedOut`] if no message arrives in time,
    /// the first socket write error, or the decoding error for malformed
    /// server output.
    pub async fn flood_until_message(&mut self, frame: &[u8]) -> io::Result<(Opcode, Bytes)> {
        let Self { frames, writer } = self;
        let flood = async {
            loop {
                if let Err(e) = writer.write_all(frame).await {
                    return Err::<(Opcode, Bytes), _>(e);
                }
            }
        };
        let receive = async {
            loop {
                match frames.next().await {
                    Some(Ok(Inbound::Message(message))) => return Ok((message.opcode, message.payload)),
                    Some(Ok(Inbound::Control(_))) => {}
                    Some(Err(e)) => return Err(into_io(e)),
                    None => return Err(unexpected("message", None)),
                }
            }
        };
        let race = async {
            tokio::select! {
                biased;
                received = receive => received,
                failed = flood => failed,
            }
        };
        timeout(READ_TIMEOUT, race)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no message from server"))?
    }

    /// Next complete data message as `(opcode, payload)`.
    ///
    /// # Errors
    ///
    /// Fails if the server sends a control frame first or closes the
    /// socket, and as for [`next`](Self::next).
    pub async fn next_message(&mut self) -> io::Result<(Opcode, Bytes)> {
        match self.next().await? {
            Some(Inbound::Message(message)) => Ok((message.opcode, message.payload)),
            other => Err(unexpected("message", other.as_ref())),
        }
    }

    /// Next control frame.
    ///
    /// # Errors
    ///
    /// Fails if the server sends a data message first or closes the socket,
    /// and as for [`next`](Self::next).
    pub async fn next_control(&mut self) -> io::Result<Frame> {
        match self.next().await? {
            Some(Inbound::Control(frame)) => Ok(frame),
            other => Err(unexpected("control frame", other.as_ref())),
        }
    }

    /// Wait for the server's close frame and return its status and reason.
    ///
    /// A close frame without payload yields status `1005`.
    ///
    /// # Errors
    ///
    /// Fails if anything other than a close frame arrives first, and as for
    /// [`next`](Self::next).
    pub async fn expect_close(&mut self) -> io::Result<(u16, String)> {
        let frame = self.next_control().await?;
        if frame.opcode != Opcode::Close {
            return Err(unexpected("close frame", Some(&Inbound::Control(frame))));
        }
        let Some((code, reason)) = frame.payload.split_first_chunk::<2>() else {
            return Ok((1005, String::new()));
        };
        Ok((
            u16::from_be_bytes(*code),
            String::from_utf8_lossy(reason).into_owned(),
        ))
    }

    /// Collect everything the server sends until it closes the socket.
    ///
    /// # Errors
    ///
    /// As for [`next`](Self::next).
    pub async fn drain(&mut self) -> io::Result<Vec<Inbound>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }
}

fn into_io(error: CodecError) -> io::Error {
    match error {
        CodecError::Io(e) => e,
        CodecError::Frame(e) => io::Error::new(io::ErrorKind::InvalidData, e),
    }
}

fn unexpected(wanted: &str, got: Option<&Inbound>) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("expected {wanted}, got {got:?}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_hello_matches_rfc_example() {
        let bytes = encode_client_frame(0x1, true, b"Hello", Some(TEST_MASK));
        assert_eq!(
            bytes.as_ref(),
            &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
    }

    #[test]
    fn extended_length_is_used_past_125_bytes() {
        let bytes = encode_client_frame(0x2, false, &[0u8; 126], None);
        assert_eq!(&bytes[..4], &[0x02, 126, 0x00, 126]);
        assert_eq!(bytes.len(), 4 + 126);
    }
}
