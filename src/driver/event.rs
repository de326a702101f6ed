//! Events returned by the driver's wait.

use std::io;

use tokio::io::Ready;

/// What woke the driver while open.
#[derive(Debug)]
pub(super) enum Event {
    /// The cancellation token fired.
    Cancelled,
    /// The socket is ready for the armed interest.
    Ready(Ready),
    /// A write or broadcast was queued.
    Wakeup,
    /// Waiting on the socket failed.
    Failed(io::Error),
    /// Nothing happened for a whole TTL.
    Idle,
}
