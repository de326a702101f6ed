#![doc(html_root_url = "https://docs.rs/wsengine/latest")]
//! Server-side WebSocket protocol engine.
//!
//! The host HTTP server performs the upgrade, then hands the socket to this
//! crate. [`transport::UpgradedConnection::takeover`] gives the engine sole
//! ownership of it, and a [`driver::ConnectionDriver`] runs the connection:
//! decoding frames, answering pings, dispatching messages to a
//! [`handler::Handler`], flushing queued output and performing the close
//! handshake. A [`broadcast::BroadcastGroup`] fans messages out to many
//! connections.

pub mod broadcast;
pub mod close;
pub mod config;
pub mod driver;
pub mod frame;
pub mod handler;
pub mod handshake;
pub mod metrics;
pub mod transport;

pub use broadcast::BroadcastGroup;
pub use close::{CloseCode, CloseReason};
pub use config::DriverConfig;
pub use driver::{
    CloseOutcome,
    ConnectionDriver,
    ConnectionId,
    DriverHandle,
    Initiator,
    active_connection_count,
    spawn_driver,
};
pub use frame::{Frame, FrameEvent, FrameReader, FrameWriter, Opcode, Role, WriteResult};
pub use handler::Handler;
pub use metrics::{CLOSE_TOTAL, CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
pub use transport::{TakeoverError, TakeoverFailure, TlsSession, TransportHandle, UpgradedConnection};
