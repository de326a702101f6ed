//! Demo server for `wsengine`.
//!
//! Performs a minimal HTTP upgrade, takes over the socket and echoes every
//! message. Text messages starting with `/all ` are broadcast to every
//! connected client instead.

mod cli;

use std::{io, net::SocketAddr, time::Duration};

use bytes::{Bytes, BytesMut};
use clap::Parser;
use log::{info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::timeout,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use wsengine::{
    BroadcastGroup,
    CloseCode,
    ConnectionDriver,
    DriverConfig,
    DriverHandle,
    Handler,
    Opcode,
    UpgradedConnection,
    handshake,
    spawn_driver,
};

const MAX_REQUEST_HEAD: usize = 8 * 1024;
const UPGRADE_TIMEOUT: Duration = Duration::from_secs(10);

struct Demo {
    group: BroadcastGroup<Bytes>,
    ttl: Duration,
    max_frame_size: usize,
}

impl Handler for Demo {
    type Broadcast = Bytes;

    fn handle_frame(&mut self, opcode: Opcode, payload: &Bytes, conn: &DriverHandle<Bytes>) -> bool {
        if opcode == Opcode::Text
            && let Some(rest) = payload.strip_prefix(b"/all ")
        {
            let delivered = self.group.post(payload.slice_ref(rest));
            tracing::debug!(id = %conn.id(), delivered, "broadcast posted");
            return true;
        }
        conn.write(opcode, payload.clone()).is_ok()
    }

    fn handle_message(&mut self, message: &Bytes, conn: &DriverHandle<Bytes>) -> bool {
        conn.write(Opcode::Text, message.clone()).is_ok()
    }

    fn max_input_frame_size(&self) -> usize { self.max_frame_size }

    fn ttl(&self) -> Duration { self.ttl }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    #[cfg(feature = "metrics")]
    if let Some(addr) = cli.metrics_bind {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
    }

    let listener = TcpListener::bind(cli.bind).await?;
    info!("listening: addr={}", listener.local_addr()?);

    let group = BroadcastGroup::new();
    let tracker = TaskTracker::new();
    let shutdown = CancellationToken::new();
    let config = DriverConfig::default();
    let ttl = Duration::from_secs(cli.ttl_secs);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    let handler = Demo {
                        group: group.clone(),
                        ttl,
                        max_frame_size: cli.max_frame_size,
                    };
                    let task = serve(stream, peer_addr, handler, config, tracker.clone(), shutdown.clone());
                    tracker.spawn(task);
                }
                Err(e) => warn!("accept failed: error={e}"),
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("signal handler failed: error={e}");
                }
                break;
            }
        }
    }

    info!("shutting down: connections={}", wsengine::active_connection_count());
    shutdown.cancel();
    tracker.close();
    tracker.wait().await;
    Ok(())
}

async fn serve(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Demo,
    config: DriverConfig,
    tracker: TaskTracker,
    shutdown: CancellationToken,
) {
    let connection = match timeout(UPGRADE_TIMEOUT, upgrade(stream)).await {
        Ok(Ok(Some(connection))) => connection,
        Ok(Ok(None)) => return,
        Ok(Err(e)) => {
            warn!("upgrade failed: peer_addr={peer_addr}, error={e}");
            return;
        }
        Err(_) => {
            warn!("upgrade timed out: peer_addr={peer_addr}");
            return;
        }
    };
    let transport = match connection.takeover() {
        Ok(transport) => transport,
        Err(failure) => {
            warn!("takeover failed: peer_addr={peer_addr}, error={}", failure.error);
            return;
        }
    };

    let group = handler.group.clone();
    let driver = ConnectionDriver::new(transport, handler, config).with_group(group);
    let handle = driver.handle();
    let mut run = spawn_driver(driver, &tracker);
    tokio::select! {
        _ = &mut run => {}
        () = shutdown.cancelled() => {
            handle.close(CloseCode::GoingAway, "server shutting down");
            let _ = run.await;
        }
    }
}

/// Read the HTTP request head, validate it and answer it.
///
/// Returns `None` when the request was refused or the client went away.
async fn upgrade(mut stream: TcpStream) -> io::Result<Option<UpgradedConnection>> {
    let mut buf = BytesMut::with_capacity(1024);
    let head_len = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if buf.len() >= MAX_REQUEST_HEAD || stream.read_buf(&mut buf).await? == 0 {
            return Ok(None);
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_len]).into_owned();
    let header = |name: &str| {
        head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
        })
    };

    match handshake::validate_request(header("sec-websocket-version"), header("sec-websocket-key")) {
        Ok(accept) => {
            stream
                .write_all(handshake::switching_protocols_response(&accept).as_bytes())
                .await?;
        }
        Err(e) => {
            warn!("upgrade refused: error={e}");
            stream
                .write_all(handshake::rejection_response(&e).as_bytes())
                .await?;
            return Ok(None);
        }
    }

    let leftover = buf.split_off(head_len).freeze();
    Ok(Some(
        UpgradedConnection::new(stream.into_std()?).with_buffered(leftover),
    ))
}
