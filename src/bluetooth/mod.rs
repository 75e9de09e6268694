//! Bluetooth Low Energy plumbing shared by both weight devices
//!
//! The acquisition components only talk to the radio through [`Central`] and
//! [`Peripheral`], so they run unchanged against BlueZ or a scripted backend.

pub mod bluez;
#[cfg(test)]
pub mod fake;
pub mod permissions;
pub mod progressor;
pub mod scale;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bluer::Uuid;
use futures_util::Stream;

use crate::error::BleError;

/// Platform identifier of a discovered device (a MAC address on BlueZ)
pub type DeviceId = String;

/// One observed advertisement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub id: DeviceId,
    pub name: Option<String>,
    /// Raw manufacturer-specific data, company identifier (little-endian) first
    pub manufacturer_data: Option<Vec<u8>>,
}

/// Advertisements until the stream is dropped; dropping it stops discovery.
pub type ScanEvents = Pin<Box<dyn Stream<Item = Result<Advertisement, BleError>> + Send>>;

/// Characteristic notifications; the stream ends when the link goes down.
pub type Notifications = Pin<Box<dyn Stream<Item = Result<Vec<u8>, BleError>> + Send>>;

/// The long-lived adapter handle produced by the permission gate
pub type AdapterHandle = Arc<dyn Central>;

#[async_trait]
pub trait Central: Send + Sync {
    /// Start unfiltered discovery
    async fn start_scan(&self) -> Result<ScanEvents, BleError>;

    async fn connect(&self, id: &DeviceId) -> Result<Arc<dyn Peripheral>, BleError>;
}

#[async_trait]
pub trait Peripheral: Send + Sync {
    fn id(&self) -> DeviceId;

    async fn discover_services(&self) -> Result<(), BleError>;

    async fn subscribe(&self, service: Uuid, characteristic: Uuid)
        -> Result<Notifications, BleError>;

    /// Write with response
    async fn write(&self, service: Uuid, characteristic: Uuid, value: &[u8])
        -> Result<(), BleError>;

    async fn disconnect(&self) -> Result<(), BleError>;
}
