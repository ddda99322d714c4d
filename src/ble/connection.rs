//! BLE connection management.
//!
//! Drives the transport through scan, connect and ready, and owns everything
//! that lives only while the link is up: the notification listener and the
//! status poller.

use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::ble::scanner::{scan_for_device, DeviceMatcher};
use crate::ble::transport::{Advertisement, Transport, TransportEvent};
use crate::config::MaskConfig;
use crate::dispatcher::CommandDispatcher;
use crate::error::{Error, Result};
use crate::events::{EventBus, MaskEvent};
use crate::polling::{PollIntervals, StatusPoller};
use crate::protocol::Response;
use crate::store::SessionStore;

/// Connection phase of the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionPhase {
    /// Not connected and not trying to.
    #[default]
    Idle,
    /// Looking for the mask.
    Scanning,
    /// Mask found, setting up the link.
    Connecting,
    /// Link up, ready for commands.
    Connected,
}

impl ConnectionPhase {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if a connection attempt is in progress.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Scanning | Self::Connecting)
    }
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Manages the connection to the mask.
pub struct ConnectionManager<T: Transport> {
    /// Platform transport.
    transport: Arc<T>,
    /// Controller configuration.
    config: MaskConfig,
    /// Scan predicate.
    matcher: DeviceMatcher,
    /// Current phase, shared with the dispatcher.
    phase: Arc<RwLock<ConnectionPhase>>,
    /// Mirrored session.
    store: Arc<SessionStore>,
    /// Event publisher.
    events: EventBus,
    /// Command dispatcher bound to this connection.
    dispatcher: CommandDispatcher<T>,
    /// Status polling task.
    poller: StatusPoller,
    /// Notification listener task.
    listener: Mutex<Option<JoinHandle<()>>>,
    /// Reconnect task after an unexpected disconnect.
    reconnect: Mutex<Option<JoinHandle<()>>>,
    /// Held for the duration of a connection attempt or a disconnect.
    connect_lock: tokio::sync::Mutex<()>,
    /// Cancels the current connection attempt. Replaced by every attempt.
    cancel: Mutex<CancellationToken>,
    /// Whether to reconnect after an unexpected disconnect.
    maintain_connection: RwLock<bool>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a connection manager.
    pub fn new(transport: Arc<T>, config: MaskConfig, store: Arc<SessionStore>, events: EventBus) -> Self {
        let phase = Arc::new(RwLock::new(ConnectionPhase::Idle));
        let dispatcher = CommandDispatcher::new(
            transport.clone(),
            phase.clone(),
            store.clone(),
            events.clone(),
            config.reconcile_delay,
        );

        Self {
            matcher: DeviceMatcher::new(&config),
            transport,
            config,
            phase,
            store,
            events,
            dispatcher,
            poller: StatusPoller::new(),
            listener: Mutex::new(None),
            reconnect: Mutex::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
            cancel: Mutex::new(CancellationToken::new()),
            maintain_connection: RwLock::new(false),
        }
    }

    /// Get the current connection phase.
    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.read()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.phase().is_connected()
    }

    /// The dispatcher for commands over this connection.
    pub fn dispatcher(&self) -> &CommandDispatcher<T> {
        &self.dispatcher
    }

    /// Check if we're maintaining the connection.
    pub fn is_maintaining_connection(&self) -> bool {
        *self.maintain_connection.read()
    }

    /// Whether status polling is running.
    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    /// Scan for the mask and connect to it.
    ///
    /// Returns immediately if already connected. Fails with
    /// [`Error::ConnectionInProgress`] while another attempt or a
    /// disconnect is running.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        if self.is_connected() {
            debug!("Already connected");
            return Ok(());
        }

        // Swap the token under the same lock disconnect cancels through.
        let (_attempt, cancel) = {
            let mut token = self.cancel.lock();
            let Ok(attempt) = self.connect_lock.try_lock() else {
                return Err(Error::ConnectionInProgress);
            };
            *token = CancellationToken::new();
            (attempt, token.clone())
        };

        if self.is_connected() {
            return Ok(());
        }

        *self.maintain_connection.write() = self.config.auto_reconnect;

        let result = tokio::select! {
            result = self.establish() => result,
            _ = cancel.cancelled() => Err(cancelled()),
        };

        let result = match result {
            Ok(notifications) if !cancel.is_cancelled() => {
                self.on_connected(notifications);
                Ok(())
            }
            Ok(_) => Err(cancelled()),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            error!("Connection failed: {}", e);
            self.abandon_attempt().await;
            self.events.emit_error(e);
        }

        result
    }

    /// Disconnect from the mask.
    ///
    /// Cancels a connection attempt in progress and waits for it to wind
    /// down. Never triggers a reconnect.
    pub async fn disconnect(&self) -> Result<()> {
        *self.maintain_connection.write() = false;

        let held = {
            let token = self.cancel.lock();
            match self.connect_lock.try_lock() {
                Ok(guard) => Some(guard),
                Err(_) => {
                    info!("Cancelling connection attempt");
                    token.cancel();
                    None
                }
            }
        };
        let _attempt = match held {
            Some(guard) => guard,
            None => self.connect_lock.lock().await,
        };

        if let Some(handle) = self.reconnect.lock().take() {
            handle.abort();
        }

        if !self.is_connected() {
            debug!("Already disconnected");
            return Ok(());
        }

        self.teardown();

        match self.transport.disconnect().await {
            Ok(()) => {
                info!("Successfully disconnected from mask");
                Ok(())
            }
            Err(e) => {
                error!("Failed to disconnect: {}", e);
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<mpsc::Receiver<TransportEvent>> {
        if !self.transport.request_permissions().await? {
            return Err(Error::PermissionDenied);
        }

        if !self.transport.is_powered_on().await? {
            return Err(Error::BluetoothUnavailable);
        }

        self.set_phase(ConnectionPhase::Scanning);
        let (device, _) = scan_for_device(&*self.transport, &self.matcher, &self.config).await?;

        self.set_phase(ConnectionPhase::Connecting);
        self.open_link(&device).await.map_err(Error::into_transport)
    }

    async fn open_link(&self, device: &Advertisement) -> Result<mpsc::Receiver<TransportEvent>> {
        self.transport.connect(device).await?;

        match self.transport.request_mtu(self.config.preferred_mtu).await {
            Ok(mtu) => debug!("Negotiated MTU {}", mtu),
            Err(e) => warn!("MTU negotiation failed, keeping default: {}", e),
        }

        self.transport.discover_services().await?;
        self.transport.subscribe().await
    }

    /// Clean up after a failed or cancelled attempt.
    async fn abandon_attempt(&self) {
        match self.phase() {
            ConnectionPhase::Scanning => {
                if let Err(e) = self.transport.stop_scan().await {
                    warn!("Failed to stop scan: {}", e);
                }
            }
            ConnectionPhase::Connecting => {
                if let Err(e) = self.transport.disconnect().await {
                    warn!("Failed to drop partial connection: {}", e);
                }
            }
            ConnectionPhase::Idle | ConnectionPhase::Connected => {}
        }

        self.set_phase(ConnectionPhase::Idle);
    }

    fn on_connected(self: &Arc<Self>, notifications: mpsc::Receiver<TransportEvent>) {
        self.store.reset();

        let listener = tokio::spawn(Self::listen(Arc::downgrade(self), notifications));
        if let Some(previous) = self.listener.lock().replace(listener) {
            previous.abort();
        }

        self.set_phase(ConnectionPhase::Connected);
        self.poller.start(
            self.dispatcher.clone(),
            PollIntervals {
                active: self.config.active_poll_interval,
                idle: self.config.idle_poll_interval,
            },
        );

        info!("Connected to mask");
        self.events.emit(MaskEvent::Connected);
        self.dispatcher.schedule_status(Duration::ZERO);
    }

    async fn listen(weak: Weak<Self>, mut notifications: mpsc::Receiver<TransportEvent>) {
        loop {
            let event = notifications.recv().await;
            let Some(manager) = weak.upgrade() else {
                break;
            };

            match event {
                Some(TransportEvent::Notification(payload)) => manager.handle_notification(&payload),
                Some(TransportEvent::Disconnected) | None => {
                    manager.handle_link_loss();
                    break;
                }
            }
        }
    }

    fn handle_notification(&self, payload: &[u8]) {
        trace!("Notification: {:?}", String::from_utf8_lossy(payload));

        for response in Response::decode_notification(payload) {
            self.handle_response(response);
        }
    }

    fn handle_response(&self, response: Response) {
        match response {
            Response::Ready => {
                info!("Mask reports ready");
                self.events.emit(MaskEvent::Ready);
            }
            Response::Ack(line) => {
                debug!("Command acknowledged: {}", line);
                self.store.acknowledge();
                self.events.emit(MaskEvent::CommandAcknowledged(line));
            }
            Response::DeviceError(message) => {
                warn!("Mask reported error: {}", message);
                self.store.reject();
                self.events.emit_error(&Error::DeviceReported { message });
                self.dispatcher.schedule_status(Duration::ZERO);
            }
            Response::Status(record) => {
                let session = self.store.apply_status(&record);
                debug!("Status {:?} -> session {:?}", record, session);
                self.events.emit(MaskEvent::StatusUpdated(session));
            }
            Response::TimerComplete => {
                info!("Session timer complete");
                self.events.emit(MaskEvent::TimerComplete);
                self.dispatcher.schedule_status(Duration::ZERO);
            }
        }
    }

    /// Handle a disconnect the application did not ask for.
    fn handle_link_loss(self: &Arc<Self>) {
        // Called from the listener itself, so detach instead of aborting.
        drop(self.listener.lock().take());

        if !self.is_connected() {
            return;
        }

        warn!("Connection to mask lost");
        self.teardown();

        if self.is_maintaining_connection() {
            self.spawn_reconnect();
        }
    }

    fn spawn_reconnect(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let max_attempts = self.config.max_reconnect_attempts;
        let delay = self.config.reconnect_delay;

        let handle = tokio::spawn(async move {
            for attempt in 1..=max_attempts {
                tokio::time::sleep(delay).await;

                let Some(manager) = weak.upgrade() else {
                    return;
                };
                if !manager.is_maintaining_connection() {
                    debug!("Reconnection abandoned");
                    return;
                }

                info!("Reconnection attempt {} of {}", attempt, max_attempts);
                match manager.connect().await {
                    Ok(()) => return,
                    Err(e) => warn!("Reconnection attempt {} failed: {}", attempt, e),
                }
            }

            error!("Reconnection failed after {} attempts", max_attempts);
        });

        if let Some(previous) = self.reconnect.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop link-scoped work, reset the session and report the disconnect.
    fn teardown(&self) {
        self.poller.stop();
        self.dispatcher.cancel_pending();
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        if let Some(reconnect) = self.reconnect.lock().take() {
            reconnect.abort();
        }

        self.store.reset();
        self.set_phase(ConnectionPhase::Idle);

        info!("Disconnected from mask");
        self.events.emit(MaskEvent::Disconnected);
    }

    /// Update the connection phase and emit an event.
    fn set_phase(&self, new_phase: ConnectionPhase) {
        let old_phase = {
            let mut phase = self.phase.write();
            let old = *phase;
            *phase = new_phase;
            old
        };

        if old_phase != new_phase {
            debug!("Connection phase changed: {} -> {}", old_phase, new_phase);
            self.events.emit(MaskEvent::PhaseChanged(new_phase));
        }
    }
}

fn cancelled() -> Error {
    Error::Transport {
        reason: "Connection attempt cancelled".to_string(),
    }
}

impl<T: Transport> std::fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("phase", &self.phase())
            .field("device_name", &self.config.device_name)
            .finish()
    }
}
