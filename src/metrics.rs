//! Metric helpers for `wsengine`.
//!
//! Names and thin wrappers over the [`metrics`](https://docs.rs/metrics)
//! crate. Without the `metrics` feature every helper compiles to nothing.

use crate::close::CloseCode;

/// Name of the gauge tracking running drivers.
pub const CONNECTIONS_ACTIVE: &str = "wsengine_connections_active";
/// Name of the counter tracking frames in each direction.
pub const FRAMES_PROCESSED: &str = "wsengine_frames_processed_total";
/// Name of the counter tracking closed connections by status code.
pub const CLOSE_TOTAL: &str = "wsengine_close_total";
/// Name of the counter tracking protocol and transport errors.
pub const ERRORS_TOTAL: &str = "wsengine_errors_total";
/// Name of the counter tracking panicking connection tasks.
pub const CONNECTION_PANICS: &str = "wsengine_connection_panics_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames received from the peer.
    Inbound,
    /// Frames queued for the peer.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "only labels metrics"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    metrics::gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    metrics::gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a processed frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    metrics::counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a finished connection and the status it ended with.
pub fn inc_close(code: CloseCode) {
    #[cfg(feature = "metrics")]
    metrics::counter!(CLOSE_TOTAL, "code" => u16::from(code).to_string()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = code;
}

/// Record an error occurrence.
pub fn inc_errors() {
    #[cfg(feature = "metrics")]
    metrics::counter!(ERRORS_TOTAL).increment(1);
}

/// Record a connection task that panicked.
pub fn inc_connection_panics() {
    #[cfg(feature = "metrics")]
    metrics::counter!(CONNECTION_PANICS).increment(1);
}
