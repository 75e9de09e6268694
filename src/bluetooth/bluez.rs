/// BlueZ-backed radio using the `bluer` D-Bus bindings
use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, AdapterEvent, Address, Device, Uuid};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

use crate::bluetooth::{
    AdapterHandle, Advertisement, Central, DeviceId, Notifications, Peripheral, ScanEvents,
};
use crate::error::BleError;

const SERVICE_RESOLVE_POLL_MS: u64 = 100;
const SERVICE_RESOLVE_ATTEMPTS: u32 = 100; // 10 seconds in total

/// Open the default Bluetooth adapter and power it on
pub async fn open_default_adapter() -> Result<AdapterHandle, BleError> {
    // Initialize Bluetooth session
    let session = bluer::Session::new().await.map_err(|e| {
        error!("Failed to create Bluetooth session: {}", e);
        BleError::from(e)
    })?;

    // Get the default Bluetooth adapter
    let adapter = session.default_adapter().await.map_err(|e| {
        error!("Failed to get default Bluetooth adapter: {}", e);
        BleError::from(e)
    })?;

    // Ensure Bluetooth adapter is powered on
    adapter.set_powered(true).await.map_err(|e| {
        error!("Failed to power on adapter: {}", e);
        BleError::from(e)
    })?;

    info!("Using Bluetooth adapter {}", adapter.name());

    Ok(Arc::new(BluezCentral {
        _session: session,
        adapter,
    }))
}

pub struct BluezCentral {
    // Keeps the D-Bus connection alive for as long as the adapter is in use
    _session: bluer::Session,
    adapter: Adapter,
}

/// Read the name and manufacturer data advertised by `address`
///
/// Manufacturer data is rebuilt in over-the-air order: the little-endian
/// company identifier followed by its payload.
async fn read_advertisement(adapter: &Adapter, address: Address) -> Option<Advertisement> {
    let device = adapter.device(address).ok()?;

    let name = match device.name().await {
        Ok(name) => name,
        Err(e) => {
            debug!("Failed to read name of {}: {}", address, e);
            return None;
        }
    };

    let manufacturer_data = match device.manufacturer_data().await {
        Ok(data) => data.and_then(|entries| {
            entries.into_iter().min_by_key(|(id, _)| *id).map(|(id, payload)| {
                let mut raw = id.to_le_bytes().to_vec();
                raw.extend_from_slice(&payload);
                raw
            })
        }),
        Err(e) => {
            debug!("Failed to get manufacturer data for {}: {}", address, e);
            None
        }
    };

    Some(Advertisement {
        id: address.to_string(),
        name,
        manufacturer_data,
    })
}

#[async_trait]
impl Central for BluezCentral {
    async fn start_scan(&self) -> Result<ScanEvents, BleError> {
        // Low Energy only, and report every advertisement so weight updates are not collapsed
        let filter = bluer::DiscoveryFilter {
            transport: bluer::DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        };

        // Apply the discovery filter (warn if it fails, but continue)
        if let Err(e) = self.adapter.set_discovery_filter(filter).await {
            warn!("Failed to set discovery filter: {}", e);
        }

        let discovery = self.adapter.discover_devices_with_changes().await?;
        let adapter = self.adapter.clone();

        let events = discovery.filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                match event {
                    AdapterEvent::DeviceAdded(address) => {
                        read_advertisement(&adapter, address)
                            .await
                            .map(Ok::<_, BleError>)
                    }
                    _ => None,
                }
            }
        });

        Ok(Box::pin(events))
    }

    async fn connect(&self, id: &DeviceId) -> Result<Arc<dyn Peripheral>, BleError> {
        let address: Address = id
            .parse()
            .map_err(|_| BleError::InvalidAddress(id.clone()))?;
        let device = self.adapter.device(address)?;

        if !device.is_connected().await? {
            device.connect().await?;
        }
        info!("Connected to {}", address);

        Ok(Arc::new(BluezPeripheral {
            device,
            characteristics: Mutex::new(HashMap::new()),
        }))
    }
}

pub struct BluezPeripheral {
    device: Device,
    characteristics: Mutex<HashMap<(Uuid, Uuid), Characteristic>>,
}

impl BluezPeripheral {
    async fn characteristic(&self, service: Uuid, uuid: Uuid) -> Result<Characteristic, BleError> {
        self.characteristics
            .lock()
            .await
            .get(&(service, uuid))
            .cloned()
            .ok_or(BleError::CharacteristicNotFound {
                service,
                characteristic: uuid,
            })
    }
}

#[async_trait]
impl Peripheral for BluezPeripheral {
    fn id(&self) -> DeviceId {
        self.device.address().to_string()
    }

    async fn discover_services(&self) -> Result<(), BleError> {
        let mut attempts = 0;
        while !self.device.is_services_resolved().await? {
            attempts += 1;
            if attempts >= SERVICE_RESOLVE_ATTEMPTS {
                return Err(BleError::ServicesUnresolved(self.id()));
            }
            sleep(Duration::from_millis(SERVICE_RESOLVE_POLL_MS)).await;
        }

        let mut found = HashMap::new();
        for service in self.device.services().await? {
            let service_uuid = service.uuid().await?;
            for characteristic in service.characteristics().await? {
                let uuid = characteristic.uuid().await?;
                debug!("{}: service {} characteristic {}", self.id(), service_uuid, uuid);
                found.insert((service_uuid, uuid), characteristic);
            }
        }

        *self.characteristics.lock().await = found;
        Ok(())
    }

    async fn subscribe(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Notifications, BleError> {
        let characteristic = self.characteristic(service, characteristic).await?;
        let notifications = characteristic.notify().await?;
        Ok(Box::pin(notifications.map(Ok::<_, BleError>)))
    }

    async fn write(&self, service: Uuid, characteristic: Uuid, value: &[u8]) -> Result<(), BleError> {
        let characteristic = self.characteristic(service, characteristic).await?;
        characteristic.write(value).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BleError> {
        self.device.disconnect().await?;
        Ok(())
    }
}
