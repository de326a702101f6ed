//! Driver lifecycle states and the record left when a connection ends.

use crate::close::{CloseCode, CloseReason};

/// Which side ended the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Initiator {
    /// The server closed: handler request, cancellation, idle timeout or a
    /// protocol violation by the peer.
    Local,
    /// The peer sent a close frame.
    Remote,
    /// The socket reached end of stream without a close handshake.
    Transport,
}

/// Final status of a connection, returned by
/// [`ConnectionDriver::run`](super::ConnectionDriver::run).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseOutcome {
    /// Who started the close.
    pub initiator: Initiator,
    /// Status carried by the close frame we sent, or
    /// [`CloseCode::Abnormal`] when none could be sent.
    pub code: CloseCode,
    /// Reason carried alongside `code`.
    pub reason: String,
    /// Status received from the peer. [`CloseCode::NoStatus`] marks a close
    /// frame with an empty payload.
    pub peer_code: Option<CloseCode>,
    /// Whether our close frame was completely written.
    pub close_sent: bool,
}

/// Internal run state of a [`ConnectionDriver`](super::ConnectionDriver).
#[derive(Debug)]
pub(super) enum DriverState {
    /// Transport taken over; the handler has not been started.
    Handshaking,
    /// Frames flow in both directions.
    Open,
    /// The server decided to close with the given status.
    ClosingLocal(CloseReason),
    /// The peer sent a close frame, possibly without a status.
    ClosingRemote(Option<CloseReason>),
    /// The close handshake is over.
    Closed(CloseOutcome),
}

impl DriverState {
    pub(super) fn name(&self) -> &'static str {
        match self {
            Self::Handshaking => "handshaking",
            Self::Open => "open",
            Self::ClosingLocal(_) => "closing_local",
            Self::ClosingRemote(_) => "closing_remote",
            Self::Closed(_) => "closed",
        }
    }
}
