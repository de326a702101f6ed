//! Write path: queued frames to the socket.

use std::io;

use log::{debug, warn};
use tokio::{io::Interest, time::timeout};

use super::{ConnectionDriver, state::DriverState};
use crate::{
    close::{CloseCode, CloseReason},
    frame::WriteResult,
    handler::Handler,
    metrics,
};

impl<H: Handler> ConnectionDriver<H> {
    /// Flush after write readiness. Back-pressure keeps write interest armed.
    pub(super) fn write_output(&mut self) -> Option<DriverState> {
        match self.handle.flush(&mut self.transport) {
            WriteResult::Drained | WriteResult::Blocked => None,
            WriteResult::Error(e) => Some(self.transport_failure(&e, "write")),
        }
    }

    /// Flush everything queued, waiting for write readiness as needed, for at
    /// most the configured close timeout. Returns `true` once drained.
    pub(super) async fn flush_bounded(&mut self) -> bool {
        let limit = self.config.close_timeout();
        let id = self.handle.id();
        let flush = async {
            loop {
                match self.handle.flush(&mut self.transport) {
                    WriteResult::Drained => return true,
                    WriteResult::Blocked => {
                        if let Err(e) = self.transport.ready(Interest::WRITABLE).await {
                            debug!("close flush wait failed: id={id}, error={e}");
                            return false;
                        }
                    }
                    WriteResult::Error(e) => {
                        debug!("close flush failed: id={id}, error={e}");
                        return false;
                    }
                }
            }
        };
        timeout(limit, flush).await.unwrap_or_else(|_| {
            debug!(
                "close flush timed out: id={id}, timeout_ms={}",
                limit.as_millis()
            );
            false
        })
    }

    pub(super) fn transport_failure(&mut self, error: &io::Error, op: &str) -> DriverState {
        warn!(
            "transport {op} failed: id={}, peer_addr={:?}, error={error}",
            self.handle.id(),
            self.peer_addr
        );
        metrics::inc_errors();
        DriverState::ClosingLocal(CloseReason::new(
            CloseCode::UnexpectedCondition,
            "transport failure",
        ))
    }
}
