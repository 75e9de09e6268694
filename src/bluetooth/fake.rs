//! Scripted in-memory radio for tests
//!
//! Tests push advertisements and notifications through channels and inspect
//! what the acquisition components wrote back.

use async_trait::async_trait;
use bluer::Uuid;
use futures_util::stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep, Duration, Instant};

use crate::bluetooth::{Advertisement, Central, DeviceId, Notifications, Peripheral, ScanEvents};
use crate::error::BleError;
use crate::utils::lock;

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds, failing the test after a few seconds
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        sleep(Duration::from_millis(5)).await;
    }
}

fn channel_stream<T: Send + 'static>(
    rx: UnboundedReceiver<T>,
) -> impl futures_util::Stream<Item = T> + Send {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
}

#[derive(Default)]
pub struct FakeCentral {
    scans: Mutex<Vec<UnboundedSender<Result<Advertisement, BleError>>>>,
    peripherals: Mutex<HashMap<DeviceId, Arc<FakePeripheral>>>,
    fail_scan_start: AtomicBool,
    scan_attempts: AtomicUsize,
    scans_started: AtomicUsize,
}

impl FakeCentral {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_peripheral(&self, peripheral: Arc<FakePeripheral>) {
        lock(&self.peripherals).insert(peripheral.id.clone(), peripheral);
    }

    pub fn fail_scan_start(&self, fail: bool) {
        self.fail_scan_start.store(fail, Ordering::SeqCst);
    }

    /// Deliver an advertisement to every running scan
    pub fn advertise(&self, advertisement: Advertisement) {
        for tx in lock(&self.scans).iter() {
            let _ = tx.send(Ok(advertisement.clone()));
        }
    }

    pub fn scan_error(&self, error: BleError) {
        let message = error.to_string();
        for tx in lock(&self.scans).iter() {
            let _ = tx.send(Err(BleError::Platform(message.clone())));
        }
    }

    /// Scans whose event stream is still held by a consumer
    pub fn active_scans(&self) -> usize {
        let mut scans = lock(&self.scans);
        scans.retain(|tx| !tx.is_closed());
        scans.len()
    }

    pub fn scan_attempts(&self) -> usize {
        self.scan_attempts.load(Ordering::SeqCst)
    }

    pub fn scans_started(&self) -> usize {
        self.scans_started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Central for FakeCentral {
    async fn start_scan(&self) -> Result<ScanEvents, BleError> {
        self.scan_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_scan_start.load(Ordering::SeqCst) {
            return Err(BleError::Platform("scan refused".to_string()));
        }

        self.scans_started.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = unbounded_channel();
        lock(&self.scans).push(tx);
        Ok(Box::pin(channel_stream(rx)))
    }

    async fn connect(&self, id: &DeviceId) -> Result<Arc<dyn Peripheral>, BleError> {
        let peripheral = lock(&self.peripherals)
            .get(id)
            .cloned()
            .ok_or_else(|| BleError::DeviceNotFound(id.clone()))?;

        if peripheral.fail_connect.load(Ordering::SeqCst) {
            return Err(BleError::Platform("connection refused".to_string()));
        }
        peripheral.connected.store(true, Ordering::SeqCst);
        Ok(peripheral)
    }
}

#[derive(Default)]
pub struct FakePeripheral {
    id: DeviceId,
    pub fail_connect: AtomicBool,
    pub fail_discovery: AtomicBool,
    pub fail_writes: AtomicBool,
    connected: AtomicBool,
    subscriptions: Mutex<Vec<(Uuid, Uuid)>>,
    notifications: Mutex<Option<UnboundedSender<Result<Vec<u8>, BleError>>>>,
    writes: Mutex<Vec<(Uuid, Uuid, Vec<u8>)>>,
}

impl FakePeripheral {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(FakePeripheral {
            id: id.to_string(),
            ..Default::default()
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.notifications)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    pub fn subscriptions(&self) -> Vec<(Uuid, Uuid)> {
        lock(&self.subscriptions).clone()
    }

    /// Every attempted write, including failed ones
    pub fn writes(&self) -> Vec<(Uuid, Uuid, Vec<u8>)> {
        lock(&self.writes).clone()
    }

    pub fn written_values(&self) -> Vec<Vec<u8>> {
        self.writes().into_iter().map(|(_, _, value)| value).collect()
    }

    pub fn notify(&self, payload: Vec<u8>) {
        if let Some(tx) = lock(&self.notifications).as_ref() {
            let _ = tx.send(Ok(payload));
        }
    }

    pub fn notify_error(&self) {
        if let Some(tx) = lock(&self.notifications).as_ref() {
            let _ = tx.send(Err(BleError::Platform("link lost".to_string())));
        }
    }
}

#[async_trait]
impl Peripheral for FakePeripheral {
    fn id(&self) -> DeviceId {
        self.id.clone()
    }

    async fn discover_services(&self) -> Result<(), BleError> {
        if self.fail_discovery.load(Ordering::SeqCst) {
            return Err(BleError::ServicesUnresolved(self.id.clone()));
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Notifications, BleError> {
        if !self.is_connected() {
            return Err(BleError::NotConnected);
        }
        let (tx, rx) = unbounded_channel();
        *lock(&self.notifications) = Some(tx);
        lock(&self.subscriptions).push((service, characteristic));
        Ok(Box::pin(channel_stream(rx)))
    }

    async fn write(&self, service: Uuid, characteristic: Uuid, value: &[u8]) -> Result<(), BleError> {
        lock(&self.writes).push((service, characteristic, value.to_vec()));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BleError::Platform("write rejected".to_string()));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BleError> {
        self.connected.store(false, Ordering::SeqCst);
        lock(&self.notifications).take();
        Ok(())
    }
}
