//! Failover across prioritized connection targets.
//!
//! One [`ConnectionMonitor`] task per client walks the target list in order
//! until the transport reports a link, then idles on a heartbeat until the
//! link drops and the scan restarts from the top.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use tether_fabric::{ConnectionEvent, Endpoint, Transport};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::target::Target;

const NO_TARGET: usize = usize::MAX;

/// Link state as seen by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    /// Terminal, after shutdown
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Closed,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// State shared between the monitor task and its readers
///
/// Only the monitor task writes the state and target index; any thread may
/// read them, request shutdown or wake the task early.
#[derive(Debug)]
pub struct MonitorState {
    state: AtomicU8,
    target: AtomicUsize,
    closed: AtomicBool,
    wake: Notify,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            target: AtomicUsize::new(NO_TARGET),
            closed: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }
}

impl MonitorState {
    pub fn state(&self) -> ConnectionState {
        if self.is_closed() {
            return ConnectionState::Closed;
        }
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Index of the target being tried or bound
    pub fn target_index(&self) -> Option<usize> {
        match self.target.load(Ordering::Acquire) {
            NO_TARGET => None,
            index => Some(index),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Request shutdown; true only for the first call
    pub fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            self.wake.notify_one();
        }
        first
    }

    /// Cut the current wait short
    ///
    /// Only a task already waiting is woken; no permit is stored, so a
    /// link event raised by the monitor's own bind does not shorten the
    /// following heartbeat. Shutdown uses [`close`](Self::close), which
    /// does store one.
    pub fn wake(&self) {
        self.wake.notify_waiters();
    }

    fn set(&self, state: ConnectionState, target: Option<usize>) {
        self.target
            .store(target.unwrap_or(NO_TARGET), Ordering::Release);
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Keeps a transport bound to the best reachable target
pub struct ConnectionMonitor {
    transport: Arc<dyn Transport>,
    targets: Arc<[Target]>,
    identity: String,
    timing: MonitorConfig,
    state: Arc<MonitorState>,
}

impl ConnectionMonitor {
    /// Create a monitor; link changes on `transport` wake it early
    pub fn new(
        transport: Arc<dyn Transport>,
        targets: Arc<[Target]>,
        identity: impl Into<String>,
        timing: MonitorConfig,
    ) -> Self {
        let state = Arc::new(MonitorState::default());
        let waker = Arc::clone(&state);
        transport.add_connection_listener(Arc::new(move |_: &ConnectionEvent| waker.wake()));

        Self {
            transport,
            targets,
            identity: identity.into(),
            timing,
            state,
        }
    }

    pub fn state(&self) -> Arc<MonitorState> {
        Arc::clone(&self.state)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drive the state machine until shutdown
    pub async fn run(self) {
        debug!(targets = self.targets.len(), "connection monitor started");
        self.pause(self.timing.startup_delay()).await;

        while !self.state.is_closed() {
            if self.transport.is_connected() {
                // The link may come up outside a candidate window
                if matches!(
                    self.state.state(),
                    ConnectionState::Connecting | ConnectionState::Disconnected
                ) {
                    let index = self.state.target_index();
                    self.state.set(ConnectionState::Connected, index);
                    match index.and_then(|i| self.targets.get(i)) {
                        Some(target) => info!("Connected via {}", target),
                        None => info!("Connected"),
                    }
                }
                self.pause(self.timing.heartbeat()).await;
                continue;
            }

            if self.state.state() == ConnectionState::Connected {
                info!("Disconnected, restarting target scan");
            }
            self.state.set(ConnectionState::Disconnected, None);

            match self.scan().await {
                Some(index) => {
                    self.state.set(ConnectionState::Connected, Some(index));
                    info!("Connected via {}", self.targets[index]);
                }
                None => self.pause(self.timing.poll_interval()).await,
            }
        }

        if let Err(e) = self.transport.stop_client().await {
            warn!(error = %e, "failed to stop transport client");
        }
        self.state.set(ConnectionState::Closed, None);
        debug!("connection monitor stopped");
    }

    /// Try every target in priority order, returning the one that linked
    async fn scan(&self) -> Option<usize> {
        let mut last = None;
        for (index, target) in self.targets.iter().enumerate() {
            if self.state.is_closed() {
                return None;
            }
            // A slow earlier target may link while we are moving on
            if let Some(previous) = last {
                if self.transport.is_connected() {
                    return Some(previous);
                }
            }
            last = Some(index);

            if self.attempt(index, target).await {
                return Some(index);
            }
        }
        None
    }

    async fn attempt(&self, index: usize, target: &Target) -> bool {
        self.state.set(ConnectionState::Connecting, Some(index));
        info!("Trying {}", target);

        if let Err(e) = self.bind(target).await {
            warn!("Failed to bind {}: {}", target, e);
            return false;
        }
        self.wait_for_connection().await
    }

    async fn bind(&self, target: &Target) -> tether_fabric::Result<()> {
        self.transport.stop_client().await?;
        self.transport.start_client(&self.identity).await?;
        match &target.endpoint {
            Endpoint::Address(address) => self.transport.set_server(address).await,
            Endpoint::Team(team) => self.transport.set_server_team(*team).await,
        }
    }

    /// Poll the connected flag until the candidate window closes
    async fn wait_for_connection(&self) -> bool {
        let deadline = Instant::now() + self.timing.candidate_timeout();
        loop {
            if self.state.is_closed() {
                return false;
            }
            if self.transport.is_connected() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.pause(self.timing.poll_interval().min(deadline - now))
                .await;
        }
    }

    async fn pause(&self, duration: Duration) {
        if self.state.is_closed() || duration.is_zero() {
            return;
        }
        tokio::select! {
            _ = sleep(duration) => {}
            _ = self.state.wake.notified() => {}
        }
    }
}
