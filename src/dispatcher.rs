//! Command dispatch.
//!
//! Turns user intents into protocol commands. Every state-changing command
//! follows the same sequence:
//!
//! 1. check the link is up
//! 2. apply the optimistic write to the [`SessionStore`]
//! 3. write the encoded command
//! 4. schedule a status request so the mask's answer reconciles the mirror
//!
//! A failed write never rolls the optimistic values back. The error is
//! published and returned, and a status request is sent straight away so
//! the next report shows what the mask actually did.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::ble::connection::ConnectionPhase;
use crate::ble::transport::Transport;
use crate::data::MaskMode;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::protocol::Command;
use crate::store::SessionStore;

/// Sends commands to the connected mask.
pub struct CommandDispatcher<T: Transport> {
    /// Shared transport.
    transport: Arc<T>,
    /// Connection phase owned by the connection manager.
    phase: Arc<RwLock<ConnectionPhase>>,
    /// Mirrored session.
    store: Arc<SessionStore>,
    /// Event publisher.
    events: EventBus,
    /// Delay before the reconciling status request.
    reconcile_delay: Duration,
    /// Scheduled status requests not yet sent.
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl<T: Transport> Clone for CommandDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            phase: self.phase.clone(),
            store: self.store.clone(),
            events: self.events.clone(),
            reconcile_delay: self.reconcile_delay,
            pending: self.pending.clone(),
        }
    }
}

impl<T: Transport> CommandDispatcher<T> {
    /// Create a dispatcher over shared connection state.
    pub fn new(
        transport: Arc<T>,
        phase: Arc<RwLock<ConnectionPhase>>,
        store: Arc<SessionStore>,
        events: EventBus,
        reconcile_delay: Duration,
    ) -> Self {
        Self {
            transport,
            phase,
            store,
            events,
            reconcile_delay,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The session store commands are applied to.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Start a pattern at the given intensity (0-100).
    pub async fn set_mode(&self, mode: MaskMode, intensity: u8) -> Result<()> {
        self.set_raw_mode(mode.to_raw(), intensity).await
    }

    /// Start a pattern by its firmware number (0-9).
    ///
    /// Use this for patterns newer than [`MaskMode`].
    pub async fn set_raw_mode(&self, mode: u8, intensity: u8) -> Result<()> {
        self.ensure_connected()?;
        self.execute(Command::set_mode(mode, intensity)?).await
    }

    /// Set the session timer in seconds.
    pub async fn set_timer(&self, seconds: u32) -> Result<()> {
        self.ensure_connected()?;
        self.execute(Command::set_timer(seconds)?).await
    }

    /// Stop the running session.
    pub async fn stop_session(&self) -> Result<()> {
        self.execute(Command::Stop).await
    }

    /// Ask the mask for a status report.
    pub async fn request_status(&self) -> Result<()> {
        self.execute(Command::RequestStatus).await
    }

    /// Send a status request after `delay` without waiting for it.
    ///
    /// The request is skipped if the link is down by then.
    pub(crate) fn schedule_status(&self, delay: Duration) {
        let transport = self.transport.clone();
        let phase = self.phase.clone();

        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if !phase.read().is_connected() {
                debug!("Skipping status request, mask not connected");
                return;
            }

            if let Err(e) = transport.write(&Command::RequestStatus.to_bytes()).await {
                warn!("Status request failed: {}", e);
            }
        });

        let mut pending = self.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Abort scheduled status requests that have not been sent yet.
    pub(crate) fn cancel_pending(&self) {
        let pending: Vec<_> = self.pending.lock().drain(..).collect();
        if !pending.is_empty() {
            debug!("Cancelling {} scheduled status requests", pending.len());
        }
        for handle in pending {
            handle.abort();
        }
    }

    async fn execute(&self, command: Command) -> Result<()> {
        self.ensure_connected()?;

        let id = self.store.begin(command);
        debug!("Sending command: {}", command);

        match self.transport.write(&command.to_bytes()).await {
            Ok(()) => {
                if id.is_some() {
                    self.schedule_status(self.reconcile_delay);
                }
                Ok(())
            }
            Err(e) => {
                warn!("Failed to send {}: {}", command, e);
                self.events.emit_error(&e);

                if let Some(id) = id {
                    self.store.fail(id);
                    self.schedule_status(Duration::ZERO);
                }
                Err(e)
            }
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if !self.phase.read().is_connected() {
            return Err(Error::NotConnected);
        }
        Ok(())
    }
}

impl<T: Transport> std::fmt::Debug for CommandDispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("phase", &*self.phase.read())
            .field("reconcile_delay", &self.reconcile_delay)
            .finish()
    }
}
