//! In-memory transport and simulated mask firmware for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use smart_mask_ble::{
    Advertisement, Error, MaskConfig, MaskController, MaskEvent, Result, Transport, TransportEvent,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Interprets command lines the way the mask firmware does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedMask {
    pub mode: u8,
    pub intensity: u8,
    pub time_left: u32,
    pub battery: u8,
}

impl Default for SimulatedMask {
    fn default() -> Self {
        Self {
            mode: 0,
            intensity: 0,
            time_left: 0,
            battery: 87,
        }
    }
}

impl SimulatedMask {
    /// Handle one command line and return the notifications it produces.
    pub fn handle(&mut self, line: &str) -> Vec<String> {
        let line = line.trim();
        let Some(command) = line.chars().next() else {
            return Vec::new();
        };

        match command {
            'M' => {
                if line.len() < 3 {
                    return vec!["ERROR: Invalid mode command format".to_string()];
                }
                let mode = line[1..2].parse::<i64>().unwrap_or(0);
                let intensity = line[2..].parse::<i64>().unwrap_or(0).clamp(0, 100);
                if !(0..=5).contains(&mode) {
                    return vec!["ERROR: Invalid mode value".to_string()];
                }
                self.mode = mode as u8;
                self.intensity = intensity as u8;
                vec![format!("OK: Mode={} Intensity={}", mode, intensity)]
            }
            'T' => {
                let duration = line[1..].parse::<i64>().unwrap_or(0);
                if duration <= 0 {
                    return vec!["ERROR: Invalid timer duration".to_string()];
                }
                self.time_left = duration as u32;
                vec![format!("OK: Timer set for {} seconds", duration)]
            }
            'S' => vec![self.status_line()],
            _ => vec!["ERROR: Unknown command".to_string()],
        }
    }

    pub fn status_line(&self) -> String {
        format!(
            "S:{},{},{},{}",
            self.mode, self.intensity, self.time_left, self.battery
        )
    }
}

/// State shared between a [`FakeTransport`] and the test driving it.
#[derive(Debug)]
pub struct FakeMask {
    pub firmware: Mutex<SimulatedMask>,
    pub advertisements: Mutex<Vec<Advertisement>>,
    pub writes: Mutex<Vec<String>>,
    pub permissions: AtomicBool,
    pub powered: AtomicBool,
    /// Answer writes automatically.
    pub auto_reply: AtomicBool,
    /// Fail the next write.
    pub fail_next_write: AtomicBool,
    pub connects: AtomicUsize,
    /// How long a link takes to open.
    pub connect_delay: Mutex<Duration>,
    /// Id of the last advertisement connected to.
    pub connected_to: Mutex<Option<String>>,
    scan_tx: Mutex<Option<mpsc::Sender<Advertisement>>>,
    link_tx: Mutex<Option<mpsc::Sender<TransportEvent>>>,
}

impl FakeMask {
    fn new(advertisements: Vec<Advertisement>) -> Self {
        Self {
            firmware: Mutex::new(SimulatedMask::default()),
            advertisements: Mutex::new(advertisements),
            writes: Mutex::new(Vec::new()),
            permissions: AtomicBool::new(true),
            powered: AtomicBool::new(true),
            auto_reply: AtomicBool::new(true),
            fail_next_write: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            connect_delay: Mutex::new(Duration::ZERO),
            connected_to: Mutex::new(None),
            scan_tx: Mutex::new(None),
            link_tx: Mutex::new(None),
        }
    }

    /// Push a raw notification to the connected controller.
    pub async fn notify(&self, line: &str) {
        let tx = self.link_tx.lock().clone();
        if let Some(tx) = tx {
            let _ = tx
                .send(TransportEvent::Notification(Bytes::from(line.to_string())))
                .await;
        }
    }

    /// Simulate the link dropping.
    pub async fn drop_link(&self) {
        let tx = self.link_tx.lock().take();
        if let Some(tx) = tx {
            let _ = tx.send(TransportEvent::Disconnected).await;
        }
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    pub fn count_writes(&self, line: &str) -> usize {
        self.writes.lock().iter().filter(|w| w.as_str() == line).count()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().clear();
    }
}

/// [`Transport`] backed by a [`FakeMask`].
pub struct FakeTransport {
    mask: Arc<FakeMask>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn request_permissions(&self) -> Result<bool> {
        Ok(self.mask.permissions.load(Ordering::SeqCst))
    }

    async fn is_powered_on(&self) -> Result<bool> {
        Ok(self.mask.powered.load(Ordering::SeqCst))
    }

    async fn start_scan(&self) -> Result<mpsc::Receiver<Advertisement>> {
        let (tx, rx) = mpsc::channel(16);
        for adv in self.mask.advertisements.lock().iter() {
            let _ = tx.try_send(adv.clone());
        }
        *self.mask.scan_tx.lock() = Some(tx);
        Ok(rx)
    }

    async fn stop_scan(&self) -> Result<()> {
        self.mask.scan_tx.lock().take();
        Ok(())
    }

    async fn connect(&self, device: &Advertisement) -> Result<()> {
        let delay = *self.mask.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.mask.connects.fetch_add(1, Ordering::SeqCst);
        *self.mask.connected_to.lock() = Some(device.id.clone());
        Ok(())
    }

    async fn request_mtu(&self, mtu: u16) -> Result<u16> {
        Ok(mtu.min(185))
    }

    async fn discover_services(&self) -> Result<()> {
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<TransportEvent>> {
        let (tx, rx) = mpsc::channel(64);
        *self.mask.link_tx.lock() = Some(tx);
        Ok(rx)
    }

    async fn write(&self, payload: &[u8]) -> Result<()> {
        let line = String::from_utf8_lossy(payload).to_string();
        self.mask.writes.lock().push(line.clone());

        if self.mask.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(Error::Transport {
                reason: "GATT write failed".to_string(),
            });
        }

        if !self.mask.auto_reply.load(Ordering::SeqCst) {
            return Ok(());
        }

        let replies = self.mask.firmware.lock().handle(&line);
        for reply in replies {
            self.mask.notify(&reply).await;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.mask.link_tx.lock().take();
        Ok(())
    }
}

/// Settings that keep scans short.
pub fn test_config() -> MaskConfig {
    MaskConfig::default().with_scan_timeout(Duration::from_secs(2))
}

/// A controller over a fake mask advertising its exact name.
pub fn controller() -> (MaskController<FakeTransport>, Arc<FakeMask>) {
    controller_with(
        test_config(),
        vec![Advertisement::named("AA:BB:CC:DD:EE:FF", "SMART_MassageMask")],
    )
}

pub fn controller_with(
    config: MaskConfig,
    advertisements: Vec<Advertisement>,
) -> (MaskController<FakeTransport>, Arc<FakeMask>) {
    let mask = Arc::new(FakeMask::new(advertisements));
    let transport = FakeTransport { mask: mask.clone() };
    let controller = MaskController::with_transport(transport, config).expect("valid config");
    (controller, mask)
}

/// Wait for the first event matching `predicate`.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<MaskEvent>, predicate: F) -> MaskEvent
where
    F: Fn(&MaskEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Let spawned tasks run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
