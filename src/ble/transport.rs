//! Transport abstraction over the platform BLE stack.
//!
//! The connection manager only talks to the mask through [`Transport`], so
//! the BLE stack can be swapped for an in-memory fake in tests. The
//! production implementation is [`BtleTransport`](crate::ble::btle::BtleTransport).

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// One advertisement seen while scanning.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Advertisement {
    /// Platform identifier of the peripheral.
    pub id: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Advertised service identifiers as reported by the platform.
    pub services: Vec<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

impl Advertisement {
    /// Create an advertisement with only an id and a name.
    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Add an advertised service identifier.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.services.push(service.into());
        self
    }
}

/// Event delivered on the subscription channel of a connected mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A notification from the command/response characteristic.
    Notification(Bytes),
    /// The link dropped without being asked to.
    Disconnected,
}

/// Operations the connection manager needs from a BLE stack.
///
/// Only one peripheral is connected at a time. Implementations must be
/// usable from several tasks at once: the dispatcher, the poller and the
/// connection manager all hold the same transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Acquire BLE permissions. Returns `false` if they were denied.
    async fn request_permissions(&self) -> Result<bool>;

    /// Check whether the adapter is powered on.
    async fn is_powered_on(&self) -> Result<bool>;

    /// Start scanning. Advertisements arrive on the returned channel until
    /// [`Transport::stop_scan`] is called.
    async fn start_scan(&self) -> Result<mpsc::Receiver<Advertisement>>;

    /// Stop scanning.
    async fn stop_scan(&self) -> Result<()>;

    /// Connect to a previously advertised peripheral.
    async fn connect(&self, device: &Advertisement) -> Result<()>;

    /// Ask for a larger MTU. Returns the negotiated value.
    async fn request_mtu(&self, mtu: u16) -> Result<u16>;

    /// Discover services and locate the command/response characteristic.
    async fn discover_services(&self) -> Result<()>;

    /// Enable notifications. Notifications and link loss arrive on the
    /// returned channel.
    async fn subscribe(&self) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Write a payload to the command/response characteristic.
    async fn write(&self, payload: &[u8]) -> Result<()>;

    /// Drop the link.
    async fn disconnect(&self) -> Result<()>;
}
