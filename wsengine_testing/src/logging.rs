//! Serialised access to a process-wide `log` capture.

use std::{
    ops::{Deref, DerefMut},
    sync::{LazyLock, Mutex, MutexGuard, PoisonError},
};

use logtest::Logger;
use rstest::fixture;

static CAPTURE: LazyLock<Mutex<Logger>> = LazyLock::new(|| Mutex::new(Logger::start()));

/// Exclusive handle on the captured `log` records.
///
/// Holding the handle keeps other tests from draining records this test
/// still wants to inspect. Records left behind by the previous holder are
/// discarded on acquisition.
pub struct LoggerHandle(MutexGuard<'static, Logger>);

impl LoggerHandle {
    /// Wait for exclusive access to the capture.
    #[must_use]
    pub fn new() -> Self {
        let mut guard = CAPTURE.lock().unwrap_or_else(PoisonError::into_inner);
        while guard.pop().is_some() {}
        Self(guard)
    }

    /// Drain the capture and return the messages containing `needle`.
    pub fn messages_containing(&mut self, needle: &str) -> Vec<String> {
        std::iter::from_fn(|| self.0.pop())
            .map(|record| record.args().to_owned())
            .filter(|message| message.contains(needle))
            .collect()
    }
}

impl Default for LoggerHandle {
    fn default() -> Self { Self::new() }
}

impl Deref for LoggerHandle {
    type Target = Logger;

    fn deref(&self) -> &Logger { &self.0 }
}

impl DerefMut for LoggerHandle {
    fn deref_mut(&mut self) -> &mut Logger { &mut self.0 }
}

/// rstest fixture yielding a [`LoggerHandle`].
#[fixture]
pub fn logger() -> LoggerHandle { LoggerHandle::new() }
