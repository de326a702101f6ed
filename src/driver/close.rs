//! Close handshake and teardown.

use log::{debug, info};

use super::{
    ConnectionDriver,
    state::{CloseOutcome, DriverState, Initiator},
};
use crate::{
    close::{CloseCode, CloseReason},
    handler::Handler,
    metrics,
};

impl<H: Handler> ConnectionDriver<H> {
    /// Server-initiated close: drain input, flush, send our status.
    pub(super) async fn close_local(&mut self, status: CloseReason) -> DriverState {
        self.handle.set_enabled(false);
        self.drain_input();
        let close_sent = self.send_close(status.code, &status.reason).await;
        DriverState::Closed(CloseOutcome {
            initiator: Initiator::Local,
            code: status.code,
            reason: status.reason,
            peer_code: None,
            close_sent,
        })
    }

    /// Peer-initiated close: echo the peer's status, or ours when the peer
    /// sent none.
    pub(super) async fn close_remote(&mut self, peer: Option<CloseReason>) -> DriverState {
        self.handle.set_enabled(false);
        let local = self.handle.status();
        let (code, reason) = match (&peer, local) {
            (Some(peer), local) => (peer.code, local.map(|s| s.reason).unwrap_or_default()),
            (None, Some(local)) => (local.code, local.reason),
            (None, None) => (CloseCode::Normal, String::new()),
        };
        debug!(
            "peer closed: id={}, peer_code={:?}, reply_code={code}",
            self.handle.id(),
            peer.as_ref().map(|p| p.code)
        );
        self.drain_input();
        let close_sent = self.send_close(code, &reason).await;
        DriverState::Closed(CloseOutcome {
            initiator: Initiator::Remote,
            code,
            reason,
            peer_code: Some(peer.map_or(CloseCode::NoStatus, |p| p.code)),
            close_sent,
        })
    }

    /// The peer closed the socket without a close frame.
    pub(super) fn peer_gone(&mut self) -> DriverState {
        self.handle.set_enabled(false);
        DriverState::Closed(CloseOutcome {
            initiator: Initiator::Transport,
            code: CloseCode::Abnormal,
            reason: "connection closed by peer".to_owned(),
            peer_code: None,
            close_sent: false,
        })
    }

    /// Release the socket, leave the group and notify the handler.
    pub(super) async fn finish(&mut self, outcome: &CloseOutcome) {
        self.handle.set_enabled(false);
        if let Err(e) = self.transport.shutdown().await {
            debug!("socket shutdown failed: id={}, error={e}", self.handle.id());
        }
        if let Some(group) = &self.group {
            group.leave(self.handle.id());
        }
        self.handler.handle_end(outcome);
        metrics::inc_close(outcome.code);
        info!(
            "connection closed: id={}, peer_addr={:?}, initiator={:?}, code={}, close_sent={}",
            self.handle.id(),
            self.peer_addr,
            outcome.initiator,
            outcome.code,
            outcome.close_sent
        );
    }

    /// Discard unread input, up to the configured drain limit.
    fn drain_input(&mut self) {
        let mut drained = self.input.len();
        self.input.clear();
        while drained < self.config.drain_limit() {
            match self.transport.try_read(&mut self.scratch) {
                Ok(0) | Err(_) => break,
                Ok(n) => drained += n,
            }
        }
        if drained > 0 {
            debug!("discarded input while closing: id={}, bytes={drained}", self.handle.id());
        }
    }

    async fn send_close(&mut self, code: CloseCode, reason: &str) -> bool {
        self.handle.enqueue_close(code, reason);
        self.flush_bounded().await
    }
}
