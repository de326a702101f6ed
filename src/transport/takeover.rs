//! Moving an upgraded socket out of the host's hands.

use std::{io, net::SocketAddr};

use bytes::Bytes;
use log::debug;
use tokio::{net::TcpStream, runtime::Handle};

use super::{TakeoverError, TakeoverFailure, TlsSession, TransportHandle};

/// A socket whose HTTP upgrade has completed, still owned by the host.
pub struct UpgradedConnection {
    socket: std::net::TcpStream,
    tls: Option<Box<dyn TlsSession>>,
    buffered: Bytes,
}

impl std::fmt::Debug for UpgradedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradedConnection")
            .field("socket", &self.socket)
            .field("encrypted", &self.tls.is_some())
            .field("buffered", &self.buffered.len())
            .finish()
    }
}

impl UpgradedConnection {
    /// Wrap a plain socket.
    #[must_use]
    pub fn new(socket: std::net::TcpStream) -> Self {
        Self {
            socket,
            tls: None,
            buffered: Bytes::new(),
        }
    }

    /// Attach the TLS session established on this socket.
    #[must_use]
    pub fn with_tls(mut self, session: Box<dyn TlsSession>) -> Self {
        self.tls = Some(session);
        self
    }

    /// Hand over bytes the host read past the end of the HTTP request.
    ///
    /// The driver decodes them before anything read from the socket.
    #[must_use]
    pub fn with_buffered(mut self, bytes: Bytes) -> Self {
        self.buffered = bytes;
        self
    }

    /// Returns `true` if a TLS session is attached.
    #[must_use]
    pub fn is_encrypted(&self) -> bool { self.tls.is_some() }

    /// Remote address of the peer.
    ///
    /// # Errors
    ///
    /// Propagates the error from the socket.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> { self.socket.peer_addr() }

    /// Give the socket back to the host, for example after a failed takeover.
    #[must_use]
    pub fn into_parts(self) -> (std::net::TcpStream, Option<Box<dyn TlsSession>>) {
        (self.socket, self.tls)
    }

    /// Take exclusive ownership of the socket.
    ///
    /// The handle is duplicated, the duplicate inherits `TCP_NODELAY`, is
    /// switched to non-blocking mode and registered with the current Tokio
    /// reactor, and any TLS session is relocated onto it. Only then is the
    /// original handle closed, so nothing the host still holds can touch
    /// the new socket.
    ///
    /// # Errors
    ///
    /// Returns a [`TakeoverFailure`] holding this connection if any step
    /// fails. The host keeps its socket and TLS session.
    pub fn takeover(self) -> Result<TransportHandle, TakeoverFailure> {
        let Ok(runtime) = Handle::try_current() else {
            return Err(self.fail(TakeoverError::NoRuntime));
        };
        let duplicate = match self.socket.try_clone() {
            Ok(socket) => socket,
            Err(e) => return Err(self.fail(TakeoverError::Duplicate(e))),
        };
        if let Err(e) = copy_options(&self.socket, &duplicate) {
            return Err(self.fail(TakeoverError::Configure(e)));
        }
        let stream = {
            let _guard = runtime.enter();
            match TcpStream::from_std(duplicate) {
                Ok(stream) => stream,
                Err(e) => return Err(self.fail(TakeoverError::Register(e))),
            }
        };

        let Self {
            socket,
            mut tls,
            buffered,
        } = self;
        if let Some(session) = tls.as_mut()
            && let Err(e) = session.relocate(&stream)
        {
            return Err(TakeoverFailure {
                error: TakeoverError::Relocate(e),
                connection: Self {
                    socket,
                    tls,
                    buffered,
                },
            });
        }

        debug!(
            "socket taken over: peer_addr={:?}, encrypted={}",
            stream.peer_addr().ok(),
            tls.is_some()
        );
        drop(socket);
        Ok(TransportHandle::new(stream, tls, buffered))
    }

    fn fail(self, error: TakeoverError) -> TakeoverFailure {
        TakeoverFailure {
            error,
            connection: self,
        }
    }
}

fn copy_options(original: &std::net::TcpStream, duplicate: &std::net::TcpStream) -> io::Result<()> {
    duplicate.set_nodelay(original.nodelay()?)?;
    duplicate.set_nonblocking(true)
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Read, Write},
        net::{TcpListener, TcpStream},
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use rstest::{fixture, rstest};

    use super::*;
    use crate::frame::NonBlockingWrite;

    /// Pass-through session that counts relocations and can refuse them.
    struct Passthrough {
        relocations: Arc<AtomicUsize>,
        refuse: bool,
    }

    impl TlsSession for Passthrough {
        fn relocate(&mut self, _socket: &tokio::net::TcpStream) -> io::Result<()> {
            if self.refuse {
                return Err(io::Error::other("session pinned"));
            }
            self.relocations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn read(&mut self, socket: &tokio::net::TcpStream, buf: &mut [u8]) -> io::Result<usize> {
            socket.try_read(buf)
        }

        fn write(&mut self, socket: &tokio::net::TcpStream, buf: &[u8]) -> io::Result<usize> {
            socket.try_write(buf)
        }
    }

    #[fixture]
    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let client = TcpStream::connect(listener.local_addr().expect("addr")).expect("connect");
        let (server, _) = listener.accept().expect("accept");
        (server, client)
    }

    #[rstest]
    #[tokio::test]
    async fn takeover_yields_working_transport(pair: (TcpStream, TcpStream)) {
        let (server, mut client) = pair;
        server.set_nodelay(true).expect("nodelay");
        let mut handle = UpgradedConnection::new(server)
            .takeover()
            .expect("takeover succeeds");

        assert!(!handle.is_encrypted());
        handle
            .ready(tokio::io::Interest::WRITABLE)
            .await
            .expect("writable");
        assert_eq!(handle.try_write(b"hi").expect("write"), 2);

        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).expect("client read");
        assert_eq!(&buf, b"hi");
    }

    #[rstest]
    #[tokio::test]
    async fn buffered_input_is_read_first(pair: (TcpStream, TcpStream)) {
        let (server, mut client) = pair;
        client.write_all(b"def").expect("client write");
        let mut handle = UpgradedConnection::new(server)
            .with_buffered(Bytes::from_static(b"abc"))
            .takeover()
            .expect("takeover succeeds");
        assert!(handle.has_buffered_input());

        let mut buf = [0u8; 8];
        assert_eq!(handle.try_read(&mut buf).expect("buffered read"), 3);
        assert_eq!(&buf[..3], b"abc");
        handle
            .ready(tokio::io::Interest::READABLE)
            .await
            .expect("readable");
        assert_eq!(handle.try_read(&mut buf).expect("socket read"), 3);
        assert_eq!(&buf[..3], b"def");
    }

    #[rstest]
    #[tokio::test]
    async fn tls_session_moves_with_socket(pair: (TcpStream, TcpStream)) {
        let (server, _client) = pair;
        let relocations = Arc::new(AtomicUsize::new(0));
        let session = Passthrough {
            relocations: relocations.clone(),
            refuse: false,
        };
        let handle = UpgradedConnection::new(server)
            .with_tls(Box::new(session))
            .takeover()
            .expect("takeover succeeds");
        assert!(handle.is_encrypted());
        assert_eq!(relocations.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn failed_relocation_returns_connection_intact(pair: (TcpStream, TcpStream)) {
        let (server, mut client) = pair;
        let session = Passthrough {
            relocations: Arc::new(AtomicUsize::new(0)),
            refuse: true,
        };
        let failure = UpgradedConnection::new(server)
            .with_tls(Box::new(session))
            .takeover()
            .expect_err("relocation refused");
        assert!(matches!(failure.error, TakeoverError::Relocate(_)));
        assert!(failure.connection.is_encrypted());

        let (mut socket, tls) = failure.connection.into_parts();
        assert!(tls.is_some());
        socket.set_nonblocking(false).expect("blocking mode");
        socket.write_all(b"still mine").expect("host can still write");
        let mut buf = [0u8; 10];
        client.read_exact(&mut buf).expect("client read");
        assert_eq!(&buf, b"still mine");
    }

    #[rstest]
    fn takeover_outside_runtime_fails(pair: (TcpStream, TcpStream)) {
        let (server, _client) = pair;
        let failure = UpgradedConnection::new(server)
            .takeover()
            .expect_err("no runtime");
        assert!(matches!(failure.error, TakeoverError::NoRuntime));
    }
}
