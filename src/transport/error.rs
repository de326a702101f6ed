//! Takeover failures.

use std::io;

use thiserror::Error;

use super::UpgradedConnection;

/// Step of [`UpgradedConnection::takeover`] that failed.
#[derive(Debug, Error)]
pub enum TakeoverError {
    /// Called outside a Tokio runtime with I/O enabled.
    #[error("takeover requires a Tokio runtime")]
    NoRuntime,
    /// The socket handle could not be duplicated.
    #[error("failed to duplicate socket: {0}")]
    Duplicate(#[source] io::Error),
    /// Socket options could not be applied to the duplicate.
    #[error("failed to configure socket: {0}")]
    Configure(#[source] io::Error),
    /// The duplicate could not be registered with the reactor.
    #[error("failed to register socket: {0}")]
    Register(#[source] io::Error),
    /// The TLS session refused to move.
    #[error("failed to relocate TLS session: {0}")]
    Relocate(#[source] io::Error),
}

/// A failed takeover, returning the connection to the host.
///
/// The original socket and TLS session are left as they were, apart from
/// the non-blocking flag which duplicates share.
#[derive(Debug, Error)]
#[error("takeover failed: {error}")]
pub struct TakeoverFailure {
    /// What went wrong.
    #[source]
    pub error: TakeoverError,
    /// The connection, still owned by the host.
    pub connection: UpgradedConnection,
}
