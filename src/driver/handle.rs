//! State shared between a driver and the handles given to other tasks.

use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use thiserror::Error;
use tokio::{io::Interest, sync::Notify};
use tokio_util::sync::CancellationToken;

use crate::{
    close::{CloseCode, CloseReason},
    frame::{FrameWriter, MAX_CONTROL_PAYLOAD, NonBlockingWrite, Opcode, WriteResult},
};

/// Identifier assigned to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Allocate the next process-wide identifier.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ConnectionId({})", self.0) }
}

/// Errors returned by [`DriverHandle::write`].
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The connection is not open.
    #[error("connection is not open")]
    Closed,
    /// `Close` and `Continuation` frames are produced by the engine only.
    #[error("opcode {0:?} cannot be written directly")]
    ReservedOpcode(Opcode),
    /// A `Ping` or `Pong` payload exceeded 125 bytes.
    #[error("control frame payload too long: {0} > 125")]
    ControlTooLong(usize),
}

#[derive(Default)]
struct Outbound {
    writer: FrameWriter,
    write_armed: bool,
}

impl Outbound {
    fn push(&mut self, opcode: Opcode, payload: Bytes) {
        self.writer.enqueue(opcode, payload);
        self.write_armed = true;
        crate::metrics::inc_frames(crate::metrics::Direction::Outbound);
    }
}

pub(crate) struct Shared<M> {
    id: ConnectionId,
    outbound: Mutex<Outbound>,
    inbox: Mutex<Vec<M>>,
    status: Mutex<Option<CloseReason>>,
    wake: Notify,
    cancel: CancellationToken,
    enabled: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

impl<M> Shared<M> {
    pub(crate) fn id(&self) -> ConnectionId { self.id }

    pub(crate) fn is_enabled(&self) -> bool { self.enabled.load(Ordering::Acquire) }

    /// Queue a broadcast and wake the driver. Returns `false` once closing.
    pub(crate) fn deliver(&self, message: M) -> bool {
        if !self.is_enabled() {
            return false;
        }
        lock(&self.inbox).push(message);
        self.wake.notify_one();
        true
    }

    pub(crate) fn wakeup(&self) { self.wake.notify_one(); }
}

/// Cloneable handle for acting on a running connection.
///
/// Every method is safe to call from any thread. Frames written through the
/// handle are flushed by the driver in the order they were written.
pub struct DriverHandle<M>(pub(super) Arc<Shared<M>>);

impl<M> Clone for DriverHandle<M> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<M> fmt::Debug for DriverHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverHandle")
            .field("id", &self.0.id)
            .field("enabled", &self.0.is_enabled())
            .finish_non_exhaustive()
    }
}

impl<M> DriverHandle<M> {
    pub(crate) fn new(id: ConnectionId) -> Self {
        Self(Arc::new(Shared {
            id,
            outbound: Mutex::new(Outbound::default()),
            inbox: Mutex::new(Vec::new()),
            status: Mutex::new(None),
            wake: Notify::new(),
            cancel: CancellationToken::new(),
            enabled: AtomicBool::new(false),
        }))
    }

    pub(crate) fn downgrade(&self) -> Weak<Shared<M>> { Arc::downgrade(&self.0) }

    /// Identifier of the connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.0.id }

    /// Returns `true` while the connection is open for writes.
    #[must_use]
    pub fn is_enabled(&self) -> bool { self.0.is_enabled() }

    /// Queue a frame and arm write interest.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] if the connection is closing, the opcode is
    /// reserved for the engine, or a control payload is too long.
    pub fn write(&self, opcode: Opcode, payload: impl Into<Bytes>) -> Result<(), SendError> {
        let payload = payload.into();
        match opcode {
            Opcode::Close | Opcode::Continuation => return Err(SendError::ReservedOpcode(opcode)),
            Opcode::Ping | Opcode::Pong if payload.len() > MAX_CONTROL_PAYLOAD => {
                return Err(SendError::ControlTooLong(payload.len()));
            }
            _ => {}
        }
        {
            // `enabled` only flips under this lock, so an accepted write is
            // always queued ahead of the close frame.
            let mut out = lock(&self.0.outbound);
            if !self.is_enabled() {
                return Err(SendError::Closed);
            }
            out.push(opcode, payload);
        }
        self.0.wakeup();
        Ok(())
    }

    /// Queue a text message.
    ///
    /// # Errors
    ///
    /// See [`DriverHandle::write`].
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.write(Opcode::Text, Bytes::from(text.into()))
    }

    /// Queue a binary message.
    ///
    /// # Errors
    ///
    /// See [`DriverHandle::write`].
    pub fn send_binary(&self, data: impl Into<Bytes>) -> Result<(), SendError> {
        self.write(Opcode::Binary, data)
    }

    /// Interrupt the driver's wait so it processes pending broadcasts.
    pub fn wakeup(&self) { self.0.wakeup(); }

    /// Record the status sent when the server closes the connection.
    pub fn set_status(&self, code: CloseCode, reason: &str) {
        *lock(&self.0.status) = Some(CloseReason::new(code, reason));
    }

    /// Close the connection with the recorded status, or `GoingAway` if none
    /// was set.
    pub fn cancel(&self) { self.0.cancel.cancel(); }

    /// Record `code` and `reason`, then close.
    pub fn close(&self, code: CloseCode, reason: &str) {
        self.set_status(code, reason);
        self.cancel();
    }

    /// Unwritten outbound bytes.
    #[must_use]
    pub fn queued_bytes(&self) -> usize { lock(&self.0.outbound).writer.queued_bytes() }

    pub(super) fn enqueue(&self, opcode: Opcode, payload: Bytes) { lock(&self.0.outbound).push(opcode, payload); }

    pub(super) fn enqueue_close(&self, code: CloseCode, reason: &str) {
        let mut out = lock(&self.0.outbound);
        if code.is_sendable() {
            out.writer.enqueue_close(code, reason);
        } else {
            out.writer.enqueue(Opcode::Close, Bytes::new());
        }
        out.write_armed = true;
        crate::metrics::inc_frames(crate::metrics::Direction::Outbound);
    }

    /// Write queued frames to `io`, disarming write interest once drained.
    pub(super) fn flush<T: NonBlockingWrite + ?Sized>(&self, io: &mut T) -> WriteResult {
        let mut out = lock(&self.0.outbound);
        let result = out.writer.write(io);
        if matches!(result, WriteResult::Drained) {
            out.write_armed = false;
        }
        result
    }

    /// Readiness the driver should wait for.
    pub(super) fn interest(&self) -> Interest {
        if lock(&self.0.outbound).write_armed {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    /// Open or close the handle for writes and broadcasts.
    ///
    /// Holds the outbound lock so no write straddles the transition.
    pub(crate) fn set_enabled(&self, enabled: bool) {
        let _out = lock(&self.0.outbound);
        self.0.enabled.store(enabled, Ordering::Release);
    }

    /// Whether queued frames are waiting for the socket.
    pub(super) fn has_pending_output(&self) -> bool { lock(&self.0.outbound).write_armed }

    pub(crate) fn take_broadcasts(&self) -> Vec<M> { std::mem::take(&mut *lock(&self.0.inbox)) }

    pub(super) fn status(&self) -> Option<CloseReason> { lock(&self.0.status).clone() }

    pub(super) fn cancel_token(&self) -> &CancellationToken { &self.0.cancel }

    pub(super) fn notified(&self) -> tokio::sync::futures::Notified<'_> { self.0.wake.notified() }
}
