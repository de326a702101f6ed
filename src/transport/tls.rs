//! Seam for an encrypted session riding on the socket.

use std::io;

use tokio::net::TcpStream;

/// An established TLS session bound to a connection's socket.
///
/// The engine never negotiates TLS itself. A host that terminated TLS
/// during the HTTP exchange wraps its session in this trait so it can move
/// to the duplicated socket at takeover.
pub trait TlsSession: Send + Sync + 'static {
    /// Rebind the session to `socket`, the duplicate created at takeover.
    ///
    /// Must leave the session untouched when it fails, so the host can keep
    /// using it on the original socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be moved.
    fn relocate(&mut self, socket: &TcpStream) -> io::Result<()>;

    /// Read decrypted bytes, pulling ciphertext from `socket` without
    /// blocking.
    ///
    /// # Errors
    ///
    /// Returns `WouldBlock` when no complete record is available.
    fn read(&mut self, socket: &TcpStream, buf: &mut [u8]) -> io::Result<usize>;

    /// Encrypt and write plaintext to `socket` without blocking.
    ///
    /// # Errors
    ///
    /// Returns `WouldBlock` under back-pressure.
    fn write(&mut self, socket: &TcpStream, buf: &[u8]) -> io::Result<usize>;

    /// Send the TLS close alert. Best effort.
    ///
    /// # Errors
    ///
    /// Returns an error if the alert could not be written.
    fn close_notify(&mut self, _socket: &TcpStream) -> io::Result<()> { Ok(()) }
}
