//! Per-connection state machine.
//!
//! A [`ConnectionDriver`] owns the socket of one upgraded connection and
//! runs it to completion on a single task. While open it waits on a
//! `tokio::select!` over cancellation, socket readiness and wakeups, bounded
//! by the handler's TTL. Inbound bytes go through a
//! [`FrameReader`](crate::frame::FrameReader); outbound frames queue in the
//! [`DriverHandle`] until the socket accepts them.
//!
//! ```text
//! Handshaking -> Open -> ClosingLocal  -> Closed
//!                     -> ClosingRemote -> Closed
//!                     -> Closed (peer vanished)
//! ```

mod close;
mod counter;
mod event;
mod handle;
mod inbound;
mod outbound;
mod spawn;
mod state;

use std::{net::SocketAddr, time::Duration};

use bytes::BytesMut;
pub use counter::active_connection_count;
use counter::ActiveConnection;
use event::Event;
pub use handle::{ConnectionId, DriverHandle, SendError};
pub(crate) use handle::Shared;
use log::info;
pub use spawn::spawn_driver;
pub use state::{CloseOutcome, Initiator};
use state::DriverState;
use tokio::time::timeout;

use crate::{
    broadcast::BroadcastGroup,
    close::{CloseCode, CloseReason},
    config::DriverConfig,
    frame::{FrameReader, Role},
    handler::Handler,
    transport::TransportHandle,
};

/// Runs one WebSocket connection from takeover to teardown.
pub struct ConnectionDriver<H: Handler> {
    handler: H,
    transport: TransportHandle,
    reader: FrameReader,
    handle: DriverHandle<H::Broadcast>,
    group: Option<BroadcastGroup<H::Broadcast>>,
    config: DriverConfig,
    input: BytesMut,
    scratch: Box<[u8]>,
    ttl: Duration,
    peer_addr: Option<SocketAddr>,
}

impl<H: Handler> ConnectionDriver<H> {
    /// Create a driver for a transport obtained from
    /// [`UpgradedConnection::takeover`](crate::transport::UpgradedConnection::takeover).
    #[must_use]
    pub fn new(transport: TransportHandle, handler: H, config: DriverConfig) -> Self {
        let peer_addr = transport.peer_addr().ok();
        Self {
            reader: FrameReader::new(Role::Server, handler.max_input_frame_size()),
            ttl: handler.ttl(),
            handler,
            transport,
            handle: DriverHandle::new(ConnectionId::next()),
            group: None,
            input: BytesMut::with_capacity(config.read_chunk_size()),
            scratch: vec![0; config.read_chunk_size()].into_boxed_slice(),
            config,
            peer_addr,
        }
    }

    /// Join `group` when the connection opens and leave it when it closes.
    #[must_use]
    pub fn with_group(mut self, group: BroadcastGroup<H::Broadcast>) -> Self {
        self.group = Some(group);
        self
    }

    /// Handle for writing to or closing this connection from elsewhere.
    ///
    /// Writes are refused until [`run`](Self::run) opens the connection.
    #[must_use]
    pub fn handle(&self) -> DriverHandle<H::Broadcast> { self.handle.clone() }

    /// Identifier of this connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.handle.id() }

    /// Remote address captured at construction.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.peer_addr }

    /// Drive the connection until it closes.
    ///
    /// Every failure is resolved into a close status, so this never errors.
    /// The handler's `handle_end` has run by the time this returns.
    pub async fn run(mut self) -> CloseOutcome {
        let _active = ActiveConnection::new(self.handle.id());
        let mut state = DriverState::Handshaking;
        loop {
            let from = state.name();
            state = match state {
                DriverState::Handshaking => self.begin(),
                DriverState::Open => {
                    let event = next_event(&self.handle, &self.transport, self.ttl).await;
                    self.on_event(event)
                }
                DriverState::ClosingLocal(status) => self.close_local(status).await,
                DriverState::ClosingRemote(peer) => self.close_remote(peer).await,
                DriverState::Closed(outcome) => {
                    self.finish(&outcome).await;
                    return outcome;
                }
            };
            if from != state.name() {
                tracing::debug!(id = %self.handle.id(), from, to = state.name(), "driver state changed");
            }
        }
    }

    fn begin(&mut self) -> DriverState {
        self.handle.set_enabled(true);
        info!(
            "connection opened: id={}, peer_addr={:?}",
            self.handle.id(),
            self.peer_addr
        );
        if let Some(group) = &self.group {
            group.join(&self.handle);
        }
        self.handler.handle_begin(&self.handle);
        if self.transport.has_buffered_input()
            && let Some(next) = self.read_input()
        {
            return next;
        }
        DriverState::Open
    }

    fn on_event(&mut self, event: Event) -> DriverState {
        match event {
            Event::Cancelled => DriverState::ClosingLocal(
                self.handle
                    .status()
                    .unwrap_or_else(|| CloseReason::new(CloseCode::GoingAway, "")),
            ),
            Event::Idle => {
                info!(
                    "connection idle: id={}, ttl_ms={}",
                    self.handle.id(),
                    self.ttl.as_millis()
                );
                DriverState::ClosingLocal(CloseReason::new(CloseCode::GoingAway, "idle timeout"))
            }
            Event::Ready(ready) => {
                if (ready.is_readable() || ready.is_read_closed())
                    && let Some(next) = self.read_input()
                {
                    return next;
                }
                // Frames queued by the batch just read go out now rather than
                // after the peer stops sending.
                if (ready.is_writable() || self.handle.has_pending_output())
                    && let Some(next) = self.write_output()
                {
                    return next;
                }
                self.deliver_broadcasts()
            }
            Event::Wakeup => self.deliver_broadcasts(),
            Event::Failed(e) => self.transport_failure(&e, "poll"),
        }
    }

    fn deliver_broadcasts(&mut self) -> DriverState {
        let messages = self.handle.take_broadcasts();
        if messages.is_empty() || self.handler.process_broadcasts(messages, &self.handle) {
            DriverState::Open
        } else {
            self.close_resolved(None)
        }
    }
}

/// Wait for the next event, giving up after `ttl`.
///
/// Cancellation wins over readiness, which wins over wakeups. Readiness
/// cannot starve the inbox: each read is capped by
/// [`DriverConfig::read_budget`](crate::config::DriverConfig::read_budget)
/// and every `Ready` turn ends by delivering pending broadcasts, so a
/// lost-race wakeup is serviced on the next turn anyway.
async fn next_event<M>(handle: &DriverHandle<M>, transport: &TransportHandle, ttl: Duration) -> Event {
    let interest = handle.interest();
    let wait = async {
        tokio::select! {
            biased;
            () = handle.cancel_token().cancelled() => Event::Cancelled,
            ready = transport.ready(interest) => match ready {
                Ok(ready) => Event::Ready(ready),
                Err(e) => Event::Failed(e),
            },
            () = handle.notified() => Event::Wakeup,
        }
    };
    timeout(ttl, wait).await.unwrap_or(Event::Idle)
}
