//! Running driver count.

use std::sync::atomic::{AtomicU64, Ordering};

use super::ConnectionId;

static RUNNING_DRIVERS: AtomicU64 = AtomicU64::new(0);

/// Counts a driver as running from creation until drop, including drops
/// during a panic unwind.
pub(super) struct ActiveConnection(ConnectionId);

impl ActiveConnection {
    pub(super) fn new(id: ConnectionId) -> Self {
        let now = RUNNING_DRIVERS.fetch_add(1, Ordering::Relaxed) + 1;
        crate::metrics::inc_connections();
        tracing::trace!(%id, running = now, "driver started");
        Self(id)
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        let now = RUNNING_DRIVERS.fetch_sub(1, Ordering::Relaxed) - 1;
        crate::metrics::dec_connections();
        tracing::trace!(id = %self.0, running = now, "driver stopped");
    }
}

/// Number of drivers currently inside [`run`](super::ConnectionDriver::run).
#[must_use]
pub fn active_connection_count() -> u64 { RUNNING_DRIVERS.load(Ordering::Relaxed) }
