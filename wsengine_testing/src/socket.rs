//! Loopback socket pairs standing in for a host server's upgrade.

use std::io;

use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use wsengine::UpgradedConnection;

use crate::TestClient;

/// Connect a client to a fresh loopback listener and wrap the accepted
/// socket as if its HTTP upgrade had just completed.
///
/// # Errors
///
/// Propagates socket errors from binding, connecting or accepting.
pub async fn upgraded_pair() -> io::Result<(UpgradedConnection, TestClient)> {
    upgraded_pair_with(Bytes::new()).await
}

/// Like [`upgraded_pair`], with `leftover` handed over as bytes the host
/// read past the end of the upgrade request.
///
/// # Errors
///
/// Propagates socket errors from binding, connecting or accepting.
pub async fn upgraded_pair_with(leftover: Bytes) -> io::Result<(UpgradedConnection, TestClient)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    let (server, _) = accepted?;
    let upgraded = UpgradedConnection::new(server.into_std()?).with_buffered(leftover);
    Ok((upgraded, TestClient::new(client?)))
}
