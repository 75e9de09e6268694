/// Utility functions for timestamps, rounding and session summaries
use std::sync::{Mutex, MutexGuard};
use time::{format_description, OffsetDateTime};

use crate::models::{DeviceSelection, SessionSummary, WeightSample};

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    match format_description::parse("[day].[month].[year] - [hour]:[minute]:[second]") {
        Ok(format) => dt.format(&format).unwrap_or_else(|_| dt.to_string()),
        Err(_) => dt.to_string(),
    }
}

/// Current wall-clock time as Unix epoch milliseconds
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Round to 2 decimal places
pub fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Lock a mutex, recovering the data if a previous holder panicked
///
/// Every critical section in this crate leaves its data consistent, so a
/// poisoned lock still guards valid state.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Summarize the samples collected during one acquisition session
///
/// Returns None when no sample was collected. The mean is rounded to
/// 2 decimal places like the readings themselves.
pub fn summarize(device: DeviceSelection, samples: &[WeightSample]) -> Option<SessionSummary> {
    let first = samples.first()?;
    let last = samples.last()?;

    let count = samples.len() as f64;
    let sum: f64 = samples.iter().map(|s| s.weight).sum();
    let peak = samples.iter().map(|s| s.weight).fold(0.0_f64, f64::max);

    Some(SessionSummary {
        device,
        samples: samples.len(),
        peak,
        mean: round_hundredths(sum / count),
        duration_ms: last.timestamp - first.timestamp,
    })
}
