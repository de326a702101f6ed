//! Read path: socket bytes to handler callbacks.

use std::io;

use log::warn;

use super::{ConnectionDriver, state::DriverState};
use crate::{
    close::{CloseReason, resolve_status},
    frame::{Frame, FrameError, FrameEvent, Opcode},
    handler::Handler,
    metrics::{self, Direction},
};

impl<H: Handler> ConnectionDriver<H> {
    /// Read until the socket would block or the read budget is spent,
    /// decoding as bytes arrive.
    ///
    /// Returns the next state once the connection must leave `Open`.
    pub(super) fn read_input(&mut self) -> Option<DriverState> {
        let mut budget = self.config.read_budget();
        loop {
            match self.transport.try_read(&mut self.scratch) {
                Ok(0) => return Some(self.peer_gone()),
                Ok(n) => {
                    self.input.extend_from_slice(&self.scratch[..n]);
                    if let Some(next) = self.decode_input() {
                        return Some(next);
                    }
                    budget = budget.saturating_sub(n);
                    if budget == 0 {
                        return None;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Some(self.transport_failure(&e, "read")),
            }
        }
    }

    fn decode_input(&mut self) -> Option<DriverState> {
        loop {
            match self.reader.feed(&mut self.input) {
                FrameEvent::NeedMore => return None,
                FrameEvent::ControlReady(frame) => {
                    metrics::inc_frames(Direction::Inbound);
                    if let Err(e) = self.reader.pop_frame() {
                        return Some(self.protocol_failure(&e));
                    }
                    if let Some(next) = self.on_control(frame) {
                        return Some(next);
                    }
                }
                FrameEvent::MessageReady(message) => {
                    metrics::inc_frames(Direction::Inbound);
                    if let Err(e) = self.reader.pop_frame() {
                        return Some(self.protocol_failure(&e));
                    }
                    if !self
                        .handler
                        .handle_frame(message.opcode, &message.payload, &self.handle)
                    {
                        return Some(self.close_resolved(None));
                    }
                }
                FrameEvent::ProtocolError(e) => return Some(self.protocol_failure(&e)),
            }
        }
    }

    fn on_control(&mut self, frame: Frame) -> Option<DriverState> {
        match frame.opcode {
            Opcode::Ping => {
                self.handle.enqueue(Opcode::Pong, frame.payload);
                None
            }
            Opcode::Close => Some(match CloseReason::parse(&frame.payload) {
                Ok(peer) => DriverState::ClosingRemote(peer),
                Err(e) => {
                    warn!("invalid close frame: id={}, error={e}", self.handle.id());
                    metrics::inc_errors();
                    DriverState::ClosingLocal(CloseReason::new(e.close_code(), &e.to_string()))
                }
            }),
            _ => None,
        }
    }

    fn protocol_failure(&mut self, error: &FrameError) -> DriverState {
        warn!(
            "protocol error: id={}, peer_addr={:?}, error={error}",
            self.handle.id(),
            self.peer_addr
        );
        metrics::inc_errors();
        self.close_resolved(Some(error))
    }

    /// Close with the handler's status if set, otherwise the status implied
    /// by `error`, otherwise `Normal`.
    pub(super) fn close_resolved(&self, error: Option<&FrameError>) -> DriverState {
        let status = self.handle.status();
        let code = resolve_status(status.as_ref().map(|s| s.code), error);
        let reason = match (status, error) {
            (Some(status), _) => status.reason,
            (None, Some(error)) => error.to_string(),
            (None, None) => String::new(),
        };
        DriverState::ClosingLocal(CloseReason::new(code, &reason))
    }
}
