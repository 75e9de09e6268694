/// Error types shared by the acquisition components and the service binary
use bluer::Uuid;
use thiserror::Error;

use crate::bluetooth::permissions::Permission;

/// Failures reported by the platform Bluetooth stack or our wrapper around it.
#[derive(Error, Debug)]
pub enum BleError {
    #[error("BlueZ error: {0}")]
    Bluez(#[from] bluer::Error),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("invalid device address: {0}")]
    InvalidAddress(String),

    #[error("services of {0} were not resolved in time")]
    ServicesUnresolved(String),

    #[error("characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },

    #[error("device is not connected")]
    NotConnected,

    #[error("platform error: {0}")]
    Platform(String),
}

/// Why the adapter gate could not hand out an adapter.
///
/// Dependents treat every variant as "Bluetooth not ready"; nothing retries automatically.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("permissions denied: {0:?}")]
    PermissionDenied(Vec<Permission>),

    #[error("permission prompt failed: {0}")]
    Prompt(String),

    #[error("failed to open Bluetooth adapter: {0}")]
    Adapter(#[from] BleError),
}

/// User-facing failures of the Progressor link.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Failed to scan for devices")]
    ScanFailed,

    #[error("Failed to connect to Tindeq")]
    ConnectFailed,

    #[error("Failed to start measurement")]
    StartFailed,

    #[error("Lost connection to device")]
    ConnectionLost,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}
