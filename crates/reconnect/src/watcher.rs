//! Background connectivity watcher
//!
//! Waits for the device to drop off the host, lets the link settle, then
//! waits for it to come back. Each step that succeeds is published as a
//! [`Transition`] on a single-consumer channel. Failures are logged and end
//! the watch; the coordinator only ever sees "no further transitions".

use crate::device::DeviceSession;
use crate::types::{ConnectivityState, Transition};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Capacity of the transition channel (one slot per possible transition)
pub const TRANSITION_CHANNEL_CAPACITY: usize = 2;

/// Observes one disconnect/reconnect cycle of a device
pub struct ConnectivityWatcher {
    device: Arc<dyn DeviceSession>,
    /// Bound on the wait for the initial disconnect
    disconnect_timeout: Duration,
    /// Bound on the wait for the reconnect
    reconnect_timeout: Duration,
    settle_delay: Duration,
}

impl ConnectivityWatcher {
    pub fn new(
        device: Arc<dyn DeviceSession>,
        disconnect_timeout: Duration,
        reconnect_timeout: Duration,
        settle_delay: Duration,
    ) -> Self {
        Self {
            device,
            disconnect_timeout,
            reconnect_timeout,
            settle_delay,
        }
    }

    /// Start watching on a new task
    ///
    /// Returns the handle owning the task and the receiving end of the
    /// transition channel.
    pub fn spawn(self) -> (WatcherHandle, mpsc::Receiver<Transition>) {
        let (tx, rx) = mpsc::channel(TRANSITION_CHANNEL_CAPACITY);
        let task = tokio::spawn(self.observe(tx));
        (WatcherHandle { task }, rx)
    }

    /// Run the watch to completion, publishing transitions on `events`
    pub async fn observe(self, events: mpsc::Sender<Transition>) {
        debug!(
            "Watcher started (disconnect timeout {:?}, reconnect timeout {:?})",
            self.disconnect_timeout, self.reconnect_timeout
        );

        if let Err(e) = self.device.wait_for_unavailable(self.disconnect_timeout).await {
            warn!("Device never became unavailable: {}", e);
            return;
        }
        if !publish(&events, ConnectivityState::AwaitingReconnect).await {
            return;
        }

        tokio::time::sleep(self.settle_delay).await;

        if let Err(e) = self.device.wait_for_available(self.reconnect_timeout).await {
            warn!("Device did not become available again: {}", e);
            return;
        }
        publish(&events, ConnectivityState::Reconnected).await;
    }
}

/// Send a transition; `false` once the coordinator has gone away
async fn publish(events: &mpsc::Sender<Transition>, state: ConnectivityState) -> bool {
    let transition = Transition {
        state,
        at: Instant::now(),
    };
    match events.send(transition).await {
        Ok(()) => {
            info!("Watcher observed {}", state);
            true
        }
        Err(_) => {
            debug!("Coordinator gone, dropping {} transition", state);
            false
        }
    }
}

/// Owning handle for a running watcher task
///
/// The session is not over until [`WatcherHandle::shutdown`] has joined
/// the task.
pub struct WatcherHandle {
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the watcher if it is still waiting and wait for it to exit
    pub async fn shutdown(self) {
        if !self.task.is_finished() {
            debug!("Stopping watcher before it finished on its own");
            self.task.abort();
        }
        match self.task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!("Watcher task panicked: {}", e),
        }
    }
}
