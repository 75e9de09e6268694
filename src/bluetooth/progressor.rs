/// Tindeq Progressor GATT protocol and connection lifecycle
use bluer::Uuid;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::bluetooth::{AdapterHandle, Central, DeviceId, Notifications, Peripheral};
use crate::buffer::Recording;
use crate::error::{BleError, LinkError};
use crate::models::{ConnectionState, LinkStatus, WeightReading, WeightSample};
use crate::utils::{lock, now_millis, round_hundredths};

// Progressor GATT layout
pub const PROGRESSOR_SERVICE_UUID: Uuid = Uuid::from_u128(0x7e4e1701_1ea6_40c9_9dcc_13d34ffead57);
pub const PROGRESSOR_DATA_CHAR_UUID: Uuid =
    Uuid::from_u128(0x7e4e1702_1ea6_40c9_9dcc_13d34ffead57);
pub const PROGRESSOR_CONTROL_CHAR_UUID: Uuid =
    Uuid::from_u128(0x7e4e1703_1ea6_40c9_9dcc_13d34ffead57);

const WEIGHT_MEASUREMENT_TAG: u8 = 0x01;
const WEIGHT_OFFSET: usize = 2; // f32 little-endian, kg
const MAX_PROGRESSOR_WEIGHT_KG: f64 = 300.0;

/// Opcodes written to the control characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Tare = 0x64,
    StartMeasurement = 0x65,
    StopMeasurement = 0x66,
}

impl Command {
    /// Two-byte little-endian command frame
    pub fn payload(self) -> [u8; 2] {
        u16::from(self as u8).to_le_bytes()
    }
}

/// Decode one data-characteristic notification
///
/// Notification layout for weight measurements:
/// - Byte 0: Response tag (0x01 = weight measurement)
/// - Byte 1: Payload length (not used here)
/// - Bytes 2-5: Weight in kg (IEEE-754 f32, little-endian)
///
/// Other tags share the characteristic and are ignored. Returns None for
/// other tags, short frames, and weights outside 0..300 kg.
pub fn decode_progressor_data(data: &[u8]) -> Option<WeightReading> {
    if *data.first()? != WEIGHT_MEASUREMENT_TAG {
        return None;
    }

    let bytes: [u8; 4] = data.get(WEIGHT_OFFSET..WEIGHT_OFFSET + 4)?.try_into().ok()?;
    let weight = round_hundredths(f32::from_le_bytes(bytes) as f64);

    if !weight.is_finite() || weight < 0.0 || weight >= MAX_PROGRESSOR_WEIGHT_KG {
        return None;
    }

    Some(WeightReading::kg(weight))
}

struct LinkShared {
    state: ConnectionState,
    device: Option<Arc<dyn Peripheral>>,
    /// Bumped whenever a caller cancels; stale tasks compare and back off
    session: u64,
    recording: Recording,
}

/// Scan, connect, and stream weights from a Progressor
pub struct ProgressorLink {
    adapter: AdapterHandle,
    device_name: String,
    shared: Arc<Mutex<LinkShared>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressorLink {
    pub fn new(adapter: AdapterHandle, device_name: impl Into<String>, capacity: usize) -> Self {
        ProgressorLink {
            adapter,
            device_name: device_name.into(),
            shared: Arc::new(Mutex::new(LinkShared {
                state: ConnectionState::Idle,
                device: None,
                session: 0,
                recording: Recording::new(capacity),
            })),
            task: Mutex::new(None),
        }
    }

    /// Clear any error and start looking for the device
    ///
    /// Ignored while a scan, connection attempt, or monitoring session is in flight.
    pub fn scan_and_connect(&self) {
        let mut task = lock(&self.task);
        let session = {
            let mut shared = lock(&self.shared);
            if matches!(
                shared.state,
                ConnectionState::Scanning | ConnectionState::Connecting | ConnectionState::Monitoring
            ) {
                debug!("scan_and_connect ignored in state {:?}", shared.state);
                return;
            }
            shared.session += 1;
            shared.state = ConnectionState::Scanning;
            shared.session
        };

        info!("Scanning for {}", self.device_name);
        *task = Some(tokio::spawn(run_link(
            self.adapter.clone(),
            self.device_name.clone(),
            self.shared.clone(),
            session,
        )));
    }

    /// Cancel an in-flight scan; a connected device is left alone
    pub fn stop_scanning(&self) {
        let mut task = lock(&self.task);
        let mut shared = lock(&self.shared);
        if shared.state != ConnectionState::Scanning {
            return;
        }

        shared.session += 1;
        shared.state = ConnectionState::Idle;
        if let Some(handle) = task.take() {
            handle.abort();
        }
        info!("Stopped scanning for {}", self.device_name);
    }

    /// Tear down the link from any state
    ///
    /// The stop command is best-effort; the device handle is cleared and the
    /// state returns to Idle whether or not the write succeeds.
    pub async fn stop_monitoring(&self) {
        let device = {
            let mut task = lock(&self.task);
            if let Some(handle) = task.take() {
                handle.abort();
            }
            let mut shared = lock(&self.shared);
            shared.session += 1;
            shared.state = ConnectionState::Idle;
            shared.device.take()
        };

        let Some(device) = device else {
            return;
        };

        if let Err(e) = write_command(&*device, Command::StopMeasurement).await {
            warn!("Failed to send stop command to {}: {}", device.id(), e);
        }
        if let Err(e) = device.disconnect().await {
            warn!("Failed to disconnect from {}: {}", device.id(), e);
        }
        info!("Disconnected from {}", device.id());
    }

    /// Zero the sensor; does nothing without a connected device
    pub async fn tare(&self) {
        let device = lock(&self.shared).device.clone();
        let Some(device) = device else {
            debug!("Tare ignored, no device connected");
            return;
        };

        match write_command(&*device, Command::Tare).await {
            Ok(()) => info!("Tared {}", device.id()),
            Err(e) => warn!("Failed to tare {}: {}", device.id(), e),
        }
    }

    /// Zero the reading and clear the history; the connection is untouched
    pub fn reset(&self) {
        lock(&self.shared).recording.reset();
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.shared).state.clone()
    }

    pub fn status(&self) -> LinkStatus {
        let shared = lock(&self.shared);
        LinkStatus {
            is_connected: shared.device.is_some(),
            is_monitoring: shared.state == ConnectionState::Monitoring,
            is_loading: matches!(
                shared.state,
                ConnectionState::Scanning | ConnectionState::Connecting
            ),
            error: match &shared.state {
                ConnectionState::Error(e) => Some(e.clone()),
                _ => None,
            },
        }
    }

    pub fn current_reading(&self) -> WeightReading {
        lock(&self.shared).recording.reading
    }

    pub fn max_weight(&self) -> f64 {
        lock(&self.shared).recording.max_weight
    }

    pub fn samples(&self) -> Vec<WeightSample> {
        lock(&self.shared).recording.samples.snapshot()
    }
}

impl Drop for ProgressorLink {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }
    }
}

async fn write_command(device: &dyn Peripheral, command: Command) -> Result<(), BleError> {
    device
        .write(
            PROGRESSOR_SERVICE_UUID,
            PROGRESSOR_CONTROL_CHAR_UUID,
            &command.payload(),
        )
        .await
}

/// Move to `state` unless a caller cancelled this session
fn transition(shared: &Mutex<LinkShared>, session: u64, state: ConnectionState) -> bool {
    let mut shared = lock(shared);
    if shared.session != session {
        return false;
    }
    shared.state = state;
    true
}

/// Record a failure and hand back the device so the caller can release it
fn fail(
    shared: &Mutex<LinkShared>,
    session: u64,
    error: LinkError,
) -> Option<Arc<dyn Peripheral>> {
    let mut shared = lock(shared);
    if shared.session != session {
        return None;
    }
    error!("{}", error);
    shared.state = ConnectionState::Error(error);
    shared.device.take()
}

async fn release(device: Option<Arc<dyn Peripheral>>) {
    if let Some(device) = device {
        if let Err(e) = device.disconnect().await {
            debug!("Disconnect after failure: {}", e);
        }
    }
}

/// Scan until a device advertises exactly `name`
///
/// Discovery stops when the event stream is dropped on return.
async fn find_device(adapter: &dyn Central, name: &str) -> Result<DeviceId, BleError> {
    let mut events = adapter.start_scan().await?;

    while let Some(event) = events.next().await {
        let advertisement = event?;
        if advertisement.name.as_deref() == Some(name) {
            info!("Found {} at {}", name, advertisement.id);
            return Ok(advertisement.id);
        }
    }

    Err(BleError::Platform("scan ended before the device was found".to_string()))
}

async fn subscribe_data(device: &dyn Peripheral) -> Result<Notifications, BleError> {
    device.discover_services().await?;
    device
        .subscribe(PROGRESSOR_SERVICE_UUID, PROGRESSOR_DATA_CHAR_UUID)
        .await
}

async fn run_link(
    adapter: AdapterHandle,
    device_name: String,
    shared: Arc<Mutex<LinkShared>>,
    session: u64,
) {
    let id = match find_device(&*adapter, &device_name).await {
        Ok(id) => id,
        Err(e) => {
            warn!("Scan for {} failed: {}", device_name, e);
            fail(&shared, session, LinkError::ScanFailed);
            return;
        }
    };

    if !transition(&shared, session, ConnectionState::Connecting) {
        return;
    }

    let device = match adapter.connect(&id).await {
        Ok(device) => device,
        Err(e) => {
            warn!("Connection to {} failed: {}", id, e);
            fail(&shared, session, LinkError::ConnectFailed);
            return;
        }
    };

    let superseded = {
        let mut guard = lock(&shared);
        if guard.session == session {
            guard.device = Some(device.clone());
        }
        guard.session != session
    };
    if superseded {
        release(Some(device)).await;
        return;
    }

    let notifications = match subscribe_data(&*device).await {
        Ok(notifications) => notifications,
        Err(e) => {
            warn!("Service setup on {} failed: {}", id, e);
            release(fail(&shared, session, LinkError::ConnectFailed)).await;
            return;
        }
    };

    if let Err(e) = write_command(&*device, Command::StartMeasurement).await {
        warn!("Start command to {} failed: {}", id, e);
        release(fail(&shared, session, LinkError::StartFailed)).await;
        return;
    }

    if !transition(&shared, session, ConnectionState::Monitoring) {
        return;
    }
    info!("Monitoring {}", id);

    monitor(notifications, &shared, session).await;
}

async fn monitor(mut notifications: Notifications, shared: &Mutex<LinkShared>, session: u64) {
    while let Some(event) = notifications.next().await {
        let payload = match event {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Notification error: {}", e);
                break;
            }
        };

        let Some(reading) = decode_progressor_data(&payload) else {
            continue;
        };

        let current = {
            let mut guard = lock(shared);
            if guard.session == session {
                guard.recording.record(reading, now_millis());
            }
            guard.session == session
        };
        if !current {
            return;
        }
        debug!("Progressor: {}", reading);
    }

    release(fail(shared, session, LinkError::ConnectionLost)).await;
}
