//! Application callbacks for a WebSocket connection.

use std::time::Duration;

use bytes::Bytes;

use crate::{
    driver::{CloseOutcome, DriverHandle},
    frame::{Opcode, reader::DEFAULT_MAX_MESSAGE_SIZE},
};

/// Idle time after which a connection is closed with `GoingAway`.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Per-connection application logic driven by a
/// [`ConnectionDriver`](crate::driver::ConnectionDriver).
///
/// Every callback runs on the driver's task. Returning `false` from a
/// dispatch callback closes the connection with the status set through
/// [`DriverHandle::set_status`], or `Normal` if none was set.
///
/// ```
/// use bytes::Bytes;
/// use wsengine::{
///     driver::DriverHandle,
///     frame::Opcode,
///     handler::Handler,
/// };
///
/// struct Echo;
///
/// impl Handler for Echo {
///     type Broadcast = Bytes;
///
///     fn handle_frame(&mut self, opcode: Opcode, payload: &Bytes, conn: &DriverHandle<Bytes>) -> bool {
///         conn.write(opcode, payload.clone()).is_ok()
///     }
/// }
/// ```
pub trait Handler: Send + 'static {
    /// Payload type delivered through a
    /// [`BroadcastGroup`](crate::broadcast::BroadcastGroup).
    type Broadcast: Clone + Send + 'static;

    /// Called once the connection is open, before any frame is read.
    fn handle_begin(&mut self, _conn: &DriverHandle<Self::Broadcast>) {}

    /// Called for every complete `Text` or `Binary` message.
    fn handle_frame(
        &mut self,
        opcode: Opcode,
        payload: &Bytes,
        conn: &DriverHandle<Self::Broadcast>,
    ) -> bool;

    /// Called for each broadcast delivered to this connection.
    fn handle_message(
        &mut self,
        _message: &Self::Broadcast,
        _conn: &DriverHandle<Self::Broadcast>,
    ) -> bool {
        true
    }

    /// Called after a wake with every broadcast queued since the last call.
    ///
    /// The default forwards each message to [`Handler::handle_message`] and
    /// stops at the first refusal.
    fn process_broadcasts(
        &mut self,
        messages: Vec<Self::Broadcast>,
        conn: &DriverHandle<Self::Broadcast>,
    ) -> bool {
        messages.iter().all(|message| self.handle_message(message, conn))
    }

    /// Called once after the close frame was sent and the socket released.
    fn handle_end(&mut self, _outcome: &CloseOutcome) {}

    /// Largest message, in bytes, accepted from the peer.
    fn max_input_frame_size(&self) -> usize { DEFAULT_MAX_MESSAGE_SIZE }

    /// Idle time after which the connection is closed.
    fn ttl(&self) -> Duration { DEFAULT_TTL }
}
