/// Broadcast scale (WH-C06 style) advertisement decoding and passive scanning
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::bluetooth::{AdapterHandle, Advertisement};
use crate::buffer::Recording;
use crate::models::{WeightReading, WeightSample};
use crate::utils::{lock, now_millis};

// Scale advertisement layout constants
const WEIGHT_OFFSET: usize = 12; // Big-endian u16, hundredths of a kg
const STABLE_OFFSET: usize = 16; // 1 when the scale has settled
const MAX_SCALE_WEIGHT_KG: f64 = 1000.0;
const SCAN_RETRY_DELAY_SECS: u64 = 2; // Pause before restarting a failed scan

/// One decoded scale advertisement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleMeasurement {
    pub reading: WeightReading,
    /// Decoded but not used to gate acceptance
    pub is_stable: bool,
}

/// Decode scale manufacturer data into a weight reading
///
/// The advertisement carries the weight in hundredths of a kilogram:
/// - Bytes 0-1: Company identifier
/// - Bytes 12-13: Weight (unsigned 16-bit, big-endian, 0.01 kg resolution)
/// - Byte 16: Stability flag (optional)
///
/// # Arguments
/// * `data` - Raw manufacturer data bytes from the BLE advertisement
///
/// # Returns
/// Some(ScaleMeasurement) if decoding succeeds, None if the payload is too
/// short or the weight is outside 0..=1000 kg
pub fn decode_scale_data(data: &[u8]) -> Option<ScaleMeasurement> {
    let bytes = data.get(WEIGHT_OFFSET..WEIGHT_OFFSET + 2)?;
    let weight = u16::from_be_bytes([bytes[0], bytes[1]]) as f64 / 100.0;

    if !weight.is_finite() || !(0.0..=MAX_SCALE_WEIGHT_KG).contains(&weight) {
        return None;
    }

    Some(ScaleMeasurement {
        reading: WeightReading::kg(weight),
        is_stable: data.get(STABLE_OFFSET) == Some(&1),
    })
}

/// Continuously scans for a broadcast scale and records its readings
pub struct PassiveScale {
    adapter: AdapterHandle,
    name_filter: String,
    recording: Arc<Mutex<Recording>>,
    scan_task: Mutex<Option<JoinHandle<()>>>,
}

impl PassiveScale {
    pub fn new(adapter: AdapterHandle, name_filter: impl Into<String>, capacity: usize) -> Self {
        PassiveScale {
            adapter,
            name_filter: name_filter.into(),
            recording: Arc::new(Mutex::new(Recording::new(capacity))),
            scan_task: Mutex::new(None),
        }
    }

    /// Begin continuous scanning; does nothing if a scan is already running
    pub fn start(&self) {
        let mut task = lock(&self.scan_task);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        info!("Starting scale scan for devices named *{}*", self.name_filter);
        *task = Some(tokio::spawn(scan_loop(
            self.adapter.clone(),
            self.name_filter.clone(),
            self.recording.clone(),
        )));
    }

    /// Halt scanning; safe to call when nothing is running
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.scan_task).take() {
            handle.abort();
            info!("Stopped scale scan");
        }
    }

    pub fn is_scanning(&self) -> bool {
        lock(&self.scan_task)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Zero the reading and clear the history without stopping the scan
    pub fn reset(&self) {
        lock(&self.recording).reset();
    }

    pub fn current_reading(&self) -> WeightReading {
        lock(&self.recording).reading
    }

    pub fn max_weight(&self) -> f64 {
        lock(&self.recording).max_weight
    }

    pub fn samples(&self) -> Vec<WeightSample> {
        lock(&self.recording).samples.snapshot()
    }

    /// Feed one advertisement through the name filter and decoder
    ///
    /// Returns true when the advertisement produced a new reading.
    fn handle_advertisement(
        recording: &Mutex<Recording>,
        name_filter: &str,
        advertisement: &Advertisement,
    ) -> bool {
        let is_scale = advertisement
            .name
            .as_deref()
            .is_some_and(|name| name.contains(name_filter));
        if !is_scale {
            return false;
        }

        let Some(data) = advertisement.manufacturer_data.as_deref() else {
            return false;
        };

        match decode_scale_data(data) {
            Some(measurement) => {
                debug!(
                    "Scale {}: {}{}",
                    advertisement.id,
                    measurement.reading,
                    if measurement.is_stable { " (stable)" } else { "" }
                );
                lock(recording).record(measurement.reading, now_millis());
                true
            }
            None => {
                debug!(
                    "Ignoring undecodable scale data from {} ({} bytes)",
                    advertisement.id,
                    data.len()
                );
                false
            }
        }
    }
}

impl Drop for PassiveScale {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn scan_loop(adapter: AdapterHandle, name_filter: String, recording: Arc<Mutex<Recording>>) {
    loop {
        let mut events = match adapter.start_scan().await {
            Ok(events) => events,
            Err(e) => {
                error!("Failed to start scale scan: {}", e);
                sleep(Duration::from_secs(SCAN_RETRY_DELAY_SECS)).await;
                continue;
            }
        };

        while let Some(event) = events.next().await {
            match event {
                Ok(advertisement) => {
                    PassiveScale::handle_advertisement(&recording, &name_filter, &advertisement);
                }
                // Radio faults are transient; the previous reading stays in place
                Err(e) => warn!("Scan error: {}", e),
            }
        }

        warn!("Scale scan ended unexpectedly, restarting");
        sleep(Duration::from_secs(SCAN_RETRY_DELAY_SECS)).await;
    }
}
