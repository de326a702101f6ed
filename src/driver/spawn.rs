//! Spawning drivers onto a task tracker.

use std::{any::Any, panic::AssertUnwindSafe};

use futures::FutureExt;
use log::{debug, error};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use super::{CloseOutcome, ConnectionDriver};
use crate::handler::Handler;

/// Run `driver` on `tracker`, logging and discarding any panic.
///
/// The join handle yields the outcome, or `None` if the task panicked.
pub fn spawn_driver<H: Handler>(
    driver: ConnectionDriver<H>,
    tracker: &TaskTracker,
) -> JoinHandle<Option<CloseOutcome>> {
    let id = driver.id();
    let peer_addr = driver.peer_addr();
    tracker.spawn(async move {
        match AssertUnwindSafe(driver.run()).catch_unwind().await {
            Ok(outcome) => {
                debug!("driver finished: id={id}, code={}", outcome.code);
                Some(outcome)
            }
            Err(panic) => {
                crate::metrics::inc_connection_panics();
                let panic_msg = panic_message(panic.as_ref());
                // Emit via both `log` and `tracing` for tests that capture either.
                error!("connection task panicked: id={id}, panic={panic_msg}, peer_addr={peer_addr:?}");
                tracing::error!(%id, panic = %panic_msg, ?peer_addr, "connection task panicked");
                None
            }
        }
    })
}

/// Text of a caught panic payload, for the two payload types `panic!`
/// produces.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&'static str>().copied())
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::panic_message;

    #[rstest]
    #[case(Box::new("boom"), "boom")]
    #[case(Box::new(String::from("bang")), "bang")]
    #[case(Box::new(7_u32), "non-string panic payload")]
    fn extracts_panic_text(#[case] payload: Box<dyn std::any::Any + Send>, #[case] expected: &str) {
        assert_eq!(panic_message(payload.as_ref()), expected);
    }
}
