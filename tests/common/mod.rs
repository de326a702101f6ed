//! Shared utilities for integration tests.
//!
//! Provides a recording [`Handler`] and helpers that spawn a driver on a
//! loopback connection, returning the client end, the driver handle and the
//! task yielding its [`CloseOutcome`].

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::time::Duration;

use bytes::Bytes;
use tokio::{sync::mpsc, task::JoinHandle, time::timeout};
use wsengine::{
    BroadcastGroup,
    CloseOutcome,
    ConnectionDriver,
    DriverConfig,
    DriverHandle,
    Handler,
    Opcode,
    UpgradedConnection,
    transport::TlsSession,
};
use wsengine_testing::{TestClient, upgraded_pair, upgraded_pair_with};

/// A callback observed by [`Probe`].
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Begin,
    Frame(Opcode, Bytes),
    Broadcast(String),
    End(CloseOutcome),
}

type FrameHook = Box<dyn FnMut(Opcode, &Bytes, &DriverHandle<String>) -> bool + Send>;

/// Handler that reports every callback on a channel.
///
/// By default frames are echoed and broadcasts are written as text.
pub struct Probe {
    calls: mpsc::UnboundedSender<Call>,
    on_frame: FrameHook,
    accept_broadcasts: bool,
    ttl: Duration,
    max_size: usize,
}

impl Probe {
    pub fn echo() -> (Self, mpsc::UnboundedReceiver<Call>) {
        let (calls, rx) = mpsc::unbounded_channel();
        let probe = Self {
            calls,
            on_frame: Box::new(|opcode: Opcode, payload: &Bytes, conn: &DriverHandle<String>| {
                conn.write(opcode, payload.clone()).is_ok()
            }),
            accept_broadcasts: true,
            ttl: Duration::from_secs(5),
            max_size: 1024,
        };
        (probe, rx)
    }

    pub fn on_frame(
        mut self,
        hook: impl FnMut(Opcode, &Bytes, &DriverHandle<String>) -> bool + Send + 'static,
    ) -> Self {
        self.on_frame = Box::new(hook);
        self
    }

    pub fn refuse_broadcasts(mut self) -> Self {
        self.accept_broadcasts = false;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    fn record(&self, call: Call) { let _ = self.calls.send(call); }
}

impl Handler for Probe {
    type Broadcast = String;

    fn handle_begin(&mut self, _conn: &DriverHandle<String>) { self.record(Call::Begin); }

    fn handle_frame(&mut self, opcode: Opcode, payload: &Bytes, conn: &DriverHandle<String>) -> bool {
        self.record(Call::Frame(opcode, payload.clone()));
        (self.on_frame)(opcode, payload, conn)
    }

    fn handle_message(&mut self, message: &String, conn: &DriverHandle<String>) -> bool {
        self.record(Call::Broadcast(message.clone()));
        self.accept_broadcasts && conn.send_text(message.clone()).is_ok()
    }

    fn handle_end(&mut self, outcome: &CloseOutcome) { self.record(Call::End(outcome.clone())); }

    fn max_input_frame_size(&self) -> usize { self.max_size }

    fn ttl(&self) -> Duration { self.ttl }
}

/// A driver running against a loopback client.
pub struct Running {
    pub client: TestClient,
    pub handle: DriverHandle<String>,
    pub task: JoinHandle<CloseOutcome>,
}

impl Running {
    /// Wait for the driver to finish.
    pub async fn outcome(self) -> CloseOutcome {
        timeout(Duration::from_secs(5), self.task)
            .await
            .expect("driver finishes")
            .expect("driver task completes")
    }
}

pub async fn start(probe: Probe) -> Running {
    let (upgraded, client) = upgraded_pair().await.expect("socket pair");
    launch(upgraded, client, probe, None, DriverConfig::default())
}

pub async fn start_with_leftover(probe: Probe, leftover: Bytes) -> Running {
    let (upgraded, client) = upgraded_pair_with(leftover).await.expect("socket pair");
    launch(upgraded, client, probe, None, DriverConfig::default())
}

pub async fn start_in_group(probe: Probe, group: &BroadcastGroup<String>) -> Running {
    let (upgraded, client) = upgraded_pair().await.expect("socket pair");
    launch(upgraded, client, probe, Some(group.clone()), DriverConfig::default())
}

pub async fn start_with_config(probe: Probe, config: DriverConfig) -> Running {
    let (upgraded, client) = upgraded_pair().await.expect("socket pair");
    launch(upgraded, client, probe, None, config)
}

pub async fn start_with_tls(probe: Probe, session: Box<dyn TlsSession>) -> Running {
    let (upgraded, client) = upgraded_pair().await.expect("socket pair");
    launch(upgraded.with_tls(session), client, probe, None, DriverConfig::default())
}

fn launch(
    upgraded: UpgradedConnection,
    client: TestClient,
    probe: Probe,
    group: Option<BroadcastGroup<String>>,
    config: DriverConfig,
) -> Running {
    let transport = upgraded.takeover().expect("takeover succeeds");
    let mut driver = ConnectionDriver::new(transport, probe, config);
    if let Some(group) = group {
        driver = driver.with_group(group);
    }
    let handle = driver.handle();
    let task = tokio::spawn(driver.run());
    Running {
        client,
        handle,
        task,
    }
}

/// Receive the next recorded call, failing after a short wait.
pub async fn next_call(rx: &mut mpsc::UnboundedReceiver<Call>) -> Call {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("callback arrives")
        .expect("probe alive")
}
