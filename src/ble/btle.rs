//! [`Transport`] implementation on top of btleplug.
//!
//! Scanning forwards adapter events as [`Advertisement`]s and remembers
//! every peripheral seen so a later [`Transport::connect`] can find it by id.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use bytes::Bytes;
use futures::stream::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::ble::transport::{Advertisement, Transport, TransportEvent};
use crate::ble::uuids::{is_mask_service, CHARACTERISTIC_UUID, SERVICE_UUID};
use crate::error::{Error, Result};

/// The connected peripheral and, once discovered, its command characteristic.
#[derive(Debug, Clone)]
struct Link {
    peripheral: Peripheral,
    characteristic: Option<Characteristic>,
}

/// BLE transport backed by the first system adapter.
pub struct BtleTransport {
    /// The BLE adapter.
    adapter: Adapter,
    /// Peripherals seen while scanning, by id.
    discovered: Arc<RwLock<HashMap<String, Peripheral>>>,
    /// Handle to the scan forwarding task.
    scan_handle: Mutex<Option<JoinHandle<()>>>,
    /// The current link, if any.
    link: Mutex<Option<Link>>,
    /// Handle to the notification forwarding task.
    notify_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BtleTransport {
    /// Create a transport on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if the platform refuses Bluetooth
    /// access, or [`Error::BluetoothUnavailable`] if there is no adapter.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await.map_err(|e| match e {
            btleplug::Error::PermissionDenied => Error::PermissionDenied,
            _ => Error::BluetoothUnavailable,
        })?;

        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a transport with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            discovered: Arc::new(RwLock::new(HashMap::new())),
            scan_handle: Mutex::new(None),
            link: Mutex::new(None),
            notify_handle: Mutex::new(None),
        }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    fn link(&self) -> Result<Link> {
        self.link.lock().clone().ok_or(Error::NotConnected)
    }

    fn characteristic(&self) -> Result<(Peripheral, Characteristic)> {
        let link = self.link()?;
        let characteristic = link.characteristic.ok_or_else(|| Error::CharacteristicNotFound {
            uuid: CHARACTERISTIC_UUID.to_string(),
        })?;
        Ok((link.peripheral, characteristic))
    }

    /// Turn an adapter event into an advertisement, caching the peripheral.
    async fn describe(
        adapter: &Adapter,
        id: &PeripheralId,
        discovered: &RwLock<HashMap<String, Peripheral>>,
    ) -> Option<Advertisement> {
        let peripheral = match adapter.peripheral(id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return None;
            }
        };

        let properties = peripheral.properties().await.ok().flatten()?;
        let identifier = id.to_string();

        discovered.write().insert(identifier.clone(), peripheral);

        Some(Advertisement {
            id: identifier,
            name: properties.local_name,
            services: properties.services.iter().map(|u| u.to_string()).collect(),
            rssi: properties.rssi,
        })
    }
}

#[async_trait]
impl Transport for BtleTransport {
    async fn request_permissions(&self) -> Result<bool> {
        // Desktop platforms grant access when the manager is created.
        match self.adapter.adapter_info().await {
            Ok(_) => Ok(true),
            Err(btleplug::Error::PermissionDenied) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn is_powered_on(&self) -> Result<bool> {
        let state = self.adapter.adapter_state().await?;
        debug!("Adapter state: {:?}", state);
        Ok(!matches!(state, CentralState::PoweredOff))
    }

    async fn start_scan(&self) -> Result<mpsc::Receiver<Advertisement>> {
        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        let (tx, rx) = mpsc::channel(64);
        let adapter = self.adapter.clone();
        let discovered = self.discovered.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id)
                    | CentralEvent::DeviceUpdated(id)
                    | CentralEvent::ServicesAdvertisement { id, .. } => id,
                    _ => continue,
                };

                let Some(advertisement) = Self::describe(&adapter, &id, &discovered).await else {
                    continue;
                };

                if tx.send(advertisement).await.is_err() {
                    break;
                }
            }

            debug!("Scan event loop ended");
        });

        if let Some(previous) = self.scan_handle.lock().replace(handle) {
            previous.abort();
        }

        Ok(rx)
    }

    async fn stop_scan(&self) -> Result<()> {
        if let Some(handle) = self.scan_handle.lock().take() {
            handle.abort();
        }

        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, device: &Advertisement) -> Result<()> {
        let peripheral = self
            .discovered
            .read()
            .get(&device.id)
            .cloned()
            .ok_or_else(|| Error::Transport {
                reason: format!("Peripheral {} not discovered", device.id),
            })?;

        peripheral.connect().await?;
        info!("Connected to peripheral {}", device.id);

        *self.link.lock() = Some(Link {
            peripheral,
            characteristic: None,
        });

        Ok(())
    }

    async fn request_mtu(&self, _mtu: u16) -> Result<u16> {
        Err(Error::NotSupported {
            operation: "MTU negotiation".to_string(),
        })
    }

    async fn discover_services(&self) -> Result<()> {
        let link = self.link()?;
        link.peripheral.discover_services().await?;

        let service = link
            .peripheral
            .services()
            .into_iter()
            .find(|s| is_mask_service(&s.uuid))
            .ok_or_else(|| Error::ServiceNotFound {
                uuid: SERVICE_UUID.to_string(),
            })?;

        let characteristic = service
            .characteristics
            .into_iter()
            .find(|c| c.uuid == CHARACTERISTIC_UUID)
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: CHARACTERISTIC_UUID.to_string(),
            })?;

        debug!(
            "Found characteristic {}, properties: {:?}",
            characteristic.uuid, characteristic.properties
        );

        if let Some(current) = self.link.lock().as_mut() {
            current.characteristic = Some(characteristic);
        }

        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<TransportEvent>> {
        let (peripheral, characteristic) = self.characteristic()?;

        peripheral.subscribe(&characteristic).await?;
        let mut notifications = peripheral.notifications().await?;
        let mut central = self.adapter.events().await?;

        let (tx, rx) = mpsc::channel(64);
        let peripheral_id = peripheral.id();

        let handle = tokio::spawn(async move {
            debug!("Notification forwarder starting");

            loop {
                tokio::select! {
                    notification = notifications.next() => match notification {
                        Some(n) if n.uuid == CHARACTERISTIC_UUID => {
                            trace!("Notification: {} bytes", n.value.len());
                            if tx.send(TransportEvent::Notification(Bytes::from(n.value))).await.is_err() {
                                break;
                            }
                        }
                        Some(_) => {}
                        None => {
                            let _ = tx.send(TransportEvent::Disconnected).await;
                            break;
                        }
                    },
                    event = central.next() => match event {
                        Some(CentralEvent::DeviceDisconnected(id)) if id == peripheral_id => {
                            let _ = tx.send(TransportEvent::Disconnected).await;
                            break;
                        }
                        Some(_) => {}
                        None => {
                            error!("Adapter event stream ended");
                            let _ = tx.send(TransportEvent::Disconnected).await;
                            break;
                        }
                    },
                }
            }

            debug!("Notification forwarder stopped");
        });

        if let Some(previous) = self.notify_handle.lock().replace(handle) {
            previous.abort();
        }

        Ok(rx)
    }

    async fn write(&self, payload: &[u8]) -> Result<()> {
        let (peripheral, characteristic) = self.characteristic()?;

        peripheral
            .write(&characteristic, payload, WriteType::WithResponse)
            .await
            .map_err(write_error)?;

        trace!("Wrote {} bytes to {}", payload.len(), characteristic.uuid);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(handle) = self.notify_handle.lock().take() {
            handle.abort();
        }

        let Some(link) = self.link.lock().take() else {
            return Ok(());
        };

        link.peripheral.disconnect().await?;
        Ok(())
    }
}

/// Characteristic write failures surface as [`Error::Transport`].
fn write_error(e: btleplug::Error) -> Error {
    Error::from(e).into_transport()
}

impl Drop for BtleTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.scan_handle.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.notify_handle.lock().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for BtleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleTransport")
            .field("discovered", &self.discovered.read().len())
            .field("connected", &self.link.lock().is_some())
            .finish()
    }
}
