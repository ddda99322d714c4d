//! Periodic status polling.
//!
//! While connected, a background task asks the mask for its status at a
//! rate that depends on whether a session is running. The interval is
//! picked again before every wait, so starting or stopping a pattern takes
//! effect on the next tick.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::ble::transport::Transport;
use crate::dispatcher::CommandDispatcher;
use crate::error::Error;

/// Poll intervals for the two session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    /// Interval while a pattern is running.
    pub active: Duration,
    /// Interval while the mask is idle.
    pub idle: Duration,
}

impl PollIntervals {
    /// Interval to wait given the current session state.
    pub fn for_session(&self, active: bool) -> Duration {
        if active {
            self.active
        } else {
            self.idle
        }
    }
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            active: Duration::from_secs(5),
            idle: Duration::from_secs(15),
        }
    }
}

/// Owner of the polling task.
#[derive(Debug, Default)]
pub struct StatusPoller {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StatusPoller {
    /// Create a stopped poller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start polling through `dispatcher`, replacing any running task.
    pub fn start<T: Transport>(&self, dispatcher: CommandDispatcher<T>, intervals: PollIntervals) {
        let handle = tokio::spawn(async move {
            loop {
                let interval = intervals.for_session(dispatcher.store().session().is_active());
                trace!("Next status poll in {:?}", interval);
                tokio::time::sleep(interval).await;

                match dispatcher.request_status().await {
                    Ok(()) => {}
                    Err(Error::NotConnected) => {
                        debug!("Polling stopped, mask not connected");
                        break;
                    }
                    // Already published by the dispatcher.
                    Err(_) => {}
                }
            }
        });

        if let Some(previous) = self.handle.lock().replace(handle) {
            previous.abort();
        }
        debug!("Status polling started");
    }

    /// Abort the polling task.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
            debug!("Status polling stopped");
        }
    }

    /// Whether a polling task is alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
