//! Mask controller.
//!
//! [`MaskController`] is the entry point of the crate. It wires the
//! transport, connection manager, session store, dispatcher and event bus
//! together. There is no global instance: build one, share it behind an
//! `Arc` if needed, and call [`MaskController::shutdown`] when done.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use crate::ble::btle::BtleTransport;
use crate::ble::connection::{ConnectionManager, ConnectionPhase};
use crate::ble::transport::Transport;
use crate::config::MaskConfig;
use crate::data::{DeviceSession, MaskMode};
use crate::error::Result;
use crate::events::{CallbackHandle, EventBus, EventKind, MaskEvent};
use crate::store::{InFlightCommand, SessionStore};

/// Controls one massage mask.
pub struct MaskController<T: Transport = BtleTransport> {
    /// Connection state machine.
    connection: Arc<ConnectionManager<T>>,
    /// Mirrored session.
    store: Arc<SessionStore>,
    /// Event publisher.
    events: EventBus,
    /// Configuration the controller was built with.
    config: MaskConfig,
}

impl MaskController<BtleTransport> {
    /// Create a controller on the first system Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        Self::with_config(MaskConfig::default()).await
    }

    /// Create a controller on the first system adapter with custom settings.
    pub async fn with_config(config: MaskConfig) -> Result<Self> {
        let transport = BtleTransport::new().await?;
        Self::with_transport(transport, config)
    }
}

impl<T: Transport> MaskController<T> {
    /// Create a controller over any [`Transport`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter)
    /// if the configuration is unusable.
    pub fn with_transport(transport: T, config: MaskConfig) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(SessionStore::new(config.stop_guard));
        let events = EventBus::new(config.event_capacity);
        let connection = Arc::new(ConnectionManager::new(
            Arc::new(transport),
            config.clone(),
            store.clone(),
            events.clone(),
        ));

        Ok(Self {
            connection,
            store,
            events,
            config,
        })
    }

    /// Scan for the mask and connect to it.
    pub async fn connect(&self) -> Result<()> {
        self.connection.connect().await
    }

    /// Disconnect, or cancel a connection attempt in progress.
    pub async fn disconnect(&self) -> Result<()> {
        self.connection.disconnect().await
    }

    /// Start a pattern at the given intensity (0-100).
    pub async fn set_mode(&self, mode: MaskMode, intensity: u8) -> Result<()> {
        self.connection.dispatcher().set_mode(mode, intensity).await
    }

    /// Start a pattern by its firmware number (0-9).
    pub async fn set_raw_mode(&self, mode: u8, intensity: u8) -> Result<()> {
        self.connection.dispatcher().set_raw_mode(mode, intensity).await
    }

    /// Set the session timer in seconds.
    pub async fn set_timer(&self, seconds: u32) -> Result<()> {
        self.connection.dispatcher().set_timer(seconds).await
    }

    /// Ask the mask for a status report.
    pub async fn request_status(&self) -> Result<()> {
        self.connection.dispatcher().request_status().await
    }

    /// Stop the running session.
    pub async fn stop_session(&self) -> Result<()> {
        self.connection.dispatcher().stop_session().await
    }

    /// Get the current connection phase.
    pub fn connection_phase(&self) -> ConnectionPhase {
        self.connection.phase()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Snapshot of the mirrored session.
    pub fn session(&self) -> DeviceSession {
        self.store.session()
    }

    /// The most recent state-changing command and its progress.
    pub fn last_command(&self) -> Option<InFlightCommand> {
        self.store.last_command()
    }

    /// When the last status report was received.
    pub fn last_status_at(&self) -> Option<DateTime<Utc>> {
        self.store.last_status_at()
    }

    /// Get the configuration.
    pub fn config(&self) -> &MaskConfig {
        &self.config
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> broadcast::Receiver<MaskEvent> {
        self.events.subscribe()
    }

    /// Register a callback for every event.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(MaskEvent) + Send + Sync + 'static,
    {
        self.events.on_event(callback)
    }

    /// Register a callback for one kind of event.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> CallbackHandle
    where
        F: Fn(MaskEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, callback)
    }

    /// Disconnect and release the controller.
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down mask controller");
        self.connection.disconnect().await
    }
}

impl<T: Transport> std::fmt::Debug for MaskController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskController")
            .field("phase", &self.connection_phase())
            .field("session", &self.session())
            .finish()
    }
}
