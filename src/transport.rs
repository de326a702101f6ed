//! Exclusive socket ownership for a running connection.
//!
//! An [`UpgradedConnection`] is what the host HTTP server hands over after a
//! successful upgrade. [`UpgradedConnection::takeover`] turns it into a
//! [`TransportHandle`] registered with the Tokio reactor, moving any TLS
//! session along with it.

mod error;
mod takeover;
mod tls;

use std::{io, net::SocketAddr};

use bytes::{Buf, Bytes};
pub use error::{TakeoverError, TakeoverFailure};
pub use takeover::UpgradedConnection;
pub use tls::TlsSession;
use tokio::{
    io::{AsyncWriteExt, Interest, Ready},
    net::TcpStream,
};

use crate::frame::NonBlockingWrite;

/// Socket owned by a [`ConnectionDriver`](crate::driver::ConnectionDriver).
///
/// Reads and writes never block. When a TLS session is attached all bytes
/// pass through it.
pub struct TransportHandle {
    stream: TcpStream,
    tls: Option<Box<dyn TlsSession>>,
    buffered: Bytes,
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("peer_addr", &self.stream.peer_addr().ok())
            .field("encrypted", &self.tls.is_some())
            .field("buffered", &self.buffered.len())
            .finish()
    }
}

impl TransportHandle {
    pub(crate) fn new(stream: TcpStream, tls: Option<Box<dyn TlsSession>>, buffered: Bytes) -> Self {
        Self {
            stream,
            tls,
            buffered,
        }
    }

    /// Remote address of the peer.
    ///
    /// # Errors
    ///
    /// Propagates the error from the socket.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> { self.stream.peer_addr() }

    /// Returns `true` if a TLS session is attached.
    #[must_use]
    pub fn is_encrypted(&self) -> bool { self.tls.is_some() }

    /// Returns `true` if input read before takeover is still pending.
    #[must_use]
    pub fn has_buffered_input(&self) -> bool { !self.buffered.is_empty() }

    /// Wait until the socket is ready for any of `interest`.
    ///
    /// # Errors
    ///
    /// Propagates reactor errors.
    pub async fn ready(&self, interest: Interest) -> io::Result<Ready> {
        self.stream.ready(interest).await
    }

    /// Read without blocking. Input buffered before takeover is returned
    /// first. `Ok(0)` means the peer closed its side.
    ///
    /// # Errors
    ///
    /// Returns `WouldBlock` when no data is available.
    pub fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.buffered.is_empty() {
            let n = buf.len().min(self.buffered.len());
            buf[..n].copy_from_slice(&self.buffered[..n]);
            self.buffered.advance(n);
            return Ok(n);
        }
        match self.tls.as_mut() {
            Some(session) => session.read(&self.stream, buf),
            None => self.stream.try_read(buf),
        }
    }

    /// Close the connection: end the TLS session if present, then shut down
    /// the write half of the socket.
    ///
    /// # Errors
    ///
    /// Returns the first error met. Both steps are always attempted.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        let notify = match self.tls.as_mut() {
            Some(session) => session.close_notify(&self.stream),
            None => Ok(()),
        };
        let shutdown = self.stream.shutdown().await;
        notify.and(shutdown)
    }
}

impl NonBlockingWrite for TransportHandle {
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.tls.as_mut() {
            Some(session) => session.write(&self.stream, buf),
            None => self.stream.try_write(buf),
        }
    }
}
