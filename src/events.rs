//! Event bus for connection, status and protocol events.
//!
//! Events are fanned out over a tokio broadcast channel. Consumers either
//! hold a [`broadcast::Receiver`] from [`EventBus::subscribe`] or register a
//! callback and keep the returned [`CallbackHandle`] for as long as they
//! want to be called.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use crate::ble::connection::ConnectionPhase;
use crate::data::DeviceSession;
use crate::error::{Error, ErrorKind};

/// An event published by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskEvent {
    /// The link is up and the mask is ready for commands.
    Connected,
    /// The link went down, on request or unexpectedly.
    Disconnected,
    /// A failure was reported.
    Error {
        /// Classification of the failure.
        kind: ErrorKind,
        /// Human readable description. For [`ErrorKind::DeviceReported`]
        /// this is the text the mask sent after `ERROR:`.
        message: String,
    },
    /// The mirrored session changed after a status report.
    StatusUpdated(DeviceSession),
    /// The mask acknowledged a command. Carries the raw `OK:` line.
    CommandAcknowledged(String),
    /// The session timer on the mask ran out.
    TimerComplete,
    /// The mask announced it is ready.
    Ready,
    /// The connection phase changed.
    PhaseChanged(ConnectionPhase),
}

/// Event category, used to filter callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`MaskEvent::Connected`]
    Connected,
    /// [`MaskEvent::Disconnected`]
    Disconnected,
    /// [`MaskEvent::Error`]
    Error,
    /// [`MaskEvent::StatusUpdated`]
    Status,
    /// [`MaskEvent::CommandAcknowledged`]
    CommandAck,
    /// [`MaskEvent::TimerComplete`]
    TimerComplete,
    /// [`MaskEvent::Ready`]
    Ready,
    /// [`MaskEvent::PhaseChanged`]
    Phase,
}

impl MaskEvent {
    /// Build an error event from a crate error.
    pub fn from_error(error: &Error) -> Self {
        let message = match error {
            Error::DeviceReported { message } => message.clone(),
            other => other.to_string(),
        };

        Self::Error {
            kind: error.kind(),
            message,
        }
    }

    /// Category of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connected,
            Self::Disconnected => EventKind::Disconnected,
            Self::Error { .. } => EventKind::Error,
            Self::StatusUpdated(_) => EventKind::Status,
            Self::CommandAcknowledged(_) => EventKind::CommandAck,
            Self::TimerComplete => EventKind::TimerComplete,
            Self::Ready => EventKind::Ready,
            Self::PhaseChanged(_) => EventKind::Phase,
        }
    }
}

/// Callback handle for unregistering callbacks.
///
/// The callback stays registered until [`CallbackHandle::unregister`] is
/// called or the handle is dropped.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle").field("id", &self.id).finish()
    }
}

/// Typed publish/subscribe channel for [`MaskEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    /// Broadcast sender shared by all publishers.
    tx: broadcast::Sender<MaskEvent>,
    /// Callback ID counter.
    callback_counter: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus that buffers up to `capacity` events per slow receiver.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));

        Self {
            tx,
            callback_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish an event. Events with no subscribers are discarded.
    pub fn emit(&self, event: MaskEvent) {
        trace!("Emitting event: {:?}", event);
        let _ = self.tx.send(event);
    }

    /// Publish an error event for `error`.
    pub fn emit_error(&self, error: &Error) {
        self.emit(MaskEvent::from_error(error));
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> broadcast::Receiver<MaskEvent> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Register a callback for every event.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(MaskEvent) + Send + Sync + 'static,
    {
        self.register(None, callback)
    }

    /// Register a callback for one kind of event.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> CallbackHandle
    where
        F: Fn(MaskEvent) + Send + Sync + 'static,
    {
        self.register(Some(kind), callback)
    }

    fn register<F>(&self, filter: Option<EventKind>, callback: F) -> CallbackHandle
    where
        F: Fn(MaskEvent) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if filter.map_or(true, |kind| event.kind() == kind) {
                            callback(event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        trace!("Callback {} lagged, skipped {} events", callback_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}
