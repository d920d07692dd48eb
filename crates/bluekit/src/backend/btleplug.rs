//! Backend implementation over btleplug
//!
//! Peripheral handles are cached by address as sightings arrive so that a
//! later `connect` can resolve an address back to a platform handle. GATT
//! capability flags and address types are translated into the crate's own
//! vocabulary at this boundary.

use std::collections::HashMap;
use std::sync::Arc;

use ::btleplug::api::{
    Central, CentralEvent, CharPropFlags, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use ::btleplug::platform::{Adapter, Manager, Peripheral as PlatformPeripheral};
use async_trait::async_trait;
use futures::stream::StreamExt;
use tokio::sync::{OnceCell, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{
    AdapterInfo, Backend, DiscoverySink, NotificationSink, SubscriptionKind,
};
use crate::error::{Error, Result};
use crate::gatt::{Capabilities, Capability, Characteristic, Descriptor, Service};
use crate::peripheral::{AddressType, PeripheralInfo};

// ----------------------------------------------------------------------------
// Error Mapping
// ----------------------------------------------------------------------------

fn scan_error(e: ::btleplug::Error) -> Error {
    match e {
        ::btleplug::Error::TimedOut(_) => Error::Timeout,
        ::btleplug::Error::NotSupported(_) => Error::NotSupported,
        other => Error::Scan(other.to_string()),
    }
}

fn connection_error(e: ::btleplug::Error) -> Error {
    match e {
        ::btleplug::Error::TimedOut(_) => Error::Timeout,
        ::btleplug::Error::NotSupported(_) => Error::NotSupported,
        other => Error::Connection(other.to_string()),
    }
}

fn gatt_error(e: ::btleplug::Error) -> Error {
    match e {
        ::btleplug::Error::TimedOut(_) => Error::Timeout,
        ::btleplug::Error::NotSupported(_) => Error::NotSupported,
        ::btleplug::Error::NotConnected => Error::NotConnected,
        other => Error::Characteristic(other.to_string()),
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Characteristic(format!("invalid UUID {}: {}", s, e)))
}

// ----------------------------------------------------------------------------
// Record Translation
// ----------------------------------------------------------------------------

fn capabilities_from_flags(flags: CharPropFlags) -> Capabilities {
    let mut capabilities = Capabilities::new();
    if flags.contains(CharPropFlags::READ) {
        capabilities.insert(Capability::Read);
    }
    if flags.contains(CharPropFlags::WRITE) {
        capabilities.insert(Capability::WriteRequest);
    }
    if flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE) {
        capabilities.insert(Capability::WriteCommand);
    }
    if flags.contains(CharPropFlags::NOTIFY) {
        capabilities.insert(Capability::Notify);
    }
    if flags.contains(CharPropFlags::INDICATE) {
        capabilities.insert(Capability::Indicate);
    }
    capabilities
}

fn address_type_from_props(
    address_type: Option<::btleplug::api::AddressType>,
) -> AddressType {
    match address_type {
        Some(::btleplug::api::AddressType::Public) => AddressType::Public,
        Some(::btleplug::api::AddressType::Random) => AddressType::Random,
        None => AddressType::Unspecified,
    }
}

fn snapshot_from_properties(
    address: String,
    properties: &::btleplug::api::PeripheralProperties,
) -> PeripheralInfo {
    let mut manufacturer_data: Vec<(u16, Vec<u8>)> = properties
        .manufacturer_data
        .iter()
        .map(|(id, data)| (*id, data.clone()))
        .collect();
    manufacturer_data.sort_by_key(|(id, _)| *id);

    PeripheralInfo {
        identifier: properties.local_name.clone().unwrap_or_default(),
        address,
        address_type: address_type_from_props(properties.address_type),
        rssi: properties.rssi.unwrap_or(0),
        tx_power: properties.tx_power_level,
        // btleplug does not surface the negotiated MTU or the connectable
        // flag in advertisement properties; a central may always attempt.
        mtu: None,
        connectable: true,
        manufacturer_data,
    }
}

/// Some platforms report adapters as "name (address)"; keep both halves when
/// that shape is recognizable, otherwise use the raw string for both.
fn parse_adapter_info(raw: &str) -> AdapterInfo {
    if let Some((name, rest)) = raw.split_once(" (") {
        if let Some(address) = rest.strip_suffix(')') {
            return AdapterInfo {
                identifier: name.to_string(),
                address: address.to_string(),
            };
        }
    }
    AdapterInfo {
        identifier: raw.to_string(),
        address: raw.to_string(),
    }
}

// ----------------------------------------------------------------------------
// Backend
// ----------------------------------------------------------------------------

/// Platform backend over btleplug.
pub struct BtleplugBackend {
    manager: OnceCell<Manager>,
    /// Adapters keyed by identifier, cached on enumeration
    adapters: RwLock<HashMap<String, Adapter>>,
    /// Peripheral handles keyed by address, cached as sightings arrive
    peripherals: Arc<RwLock<HashMap<String, PlatformPeripheral>>>,
    /// Event forwarder per scanning adapter
    scan_tasks: RwLock<HashMap<String, JoinHandle<()>>>,
    /// Notification forwarder per (address, characteristic UUID)
    subscription_tasks: RwLock<HashMap<(String, String), JoinHandle<()>>>,
}

impl BtleplugBackend {
    pub fn new() -> Self {
        Self {
            manager: OnceCell::new(),
            adapters: RwLock::new(HashMap::new()),
            peripherals: Arc::new(RwLock::new(HashMap::new())),
            scan_tasks: RwLock::new(HashMap::new()),
            subscription_tasks: RwLock::new(HashMap::new()),
        }
    }

    async fn manager(&self) -> Result<&Manager> {
        self.manager
            .get_or_try_init(|| async {
                Manager::new()
                    .await
                    .map_err(|e| Error::BluetoothNotAvailable(e.to_string()))
            })
            .await
    }

    async fn adapter_by_id(&self, adapter_id: &str) -> Result<Adapter> {
        if let Some(adapter) = self.adapters.read().await.get(adapter_id) {
            return Ok(adapter.clone());
        }
        // Cache may be cold if the caller constructed AdapterInfo itself.
        self.adapters().await?;
        self.adapters
            .read()
            .await
            .get(adapter_id)
            .cloned()
            .ok_or_else(|| Error::Scan(format!("adapter not found: {}", adapter_id)))
    }

    async fn peripheral(&self, address: &str) -> Result<PlatformPeripheral> {
        if let Some(peripheral) = self.peripherals.read().await.get(address) {
            return Ok(peripheral.clone());
        }

        // Fall back to the stack's own view, e.g. devices known to the
        // system but not sighted in this scan.
        let manager = self.manager().await?;
        let adapters = manager
            .adapters()
            .await
            .map_err(|e| Error::BluetoothNotAvailable(e.to_string()))?;
        for adapter in adapters {
            if let Ok(peripherals) = adapter.peripherals().await {
                for peripheral in peripherals {
                    if peripheral.address().to_string() == address {
                        self.peripherals
                            .write()
                            .await
                            .insert(address.to_string(), peripheral.clone());
                        return Ok(peripheral);
                    }
                }
            }
        }
        Err(Error::Connection(format!(
            "peripheral not found: {}",
            address
        )))
    }

    async fn find_characteristic(
        &self,
        address: &str,
        service: &str,
        characteristic: &str,
    ) -> Result<(PlatformPeripheral, ::btleplug::api::Characteristic)> {
        let peripheral = self.peripheral(address).await?;
        let service_uuid = parse_uuid(service)?;
        let char_uuid = parse_uuid(characteristic)?;
        let found = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == char_uuid && c.service_uuid == service_uuid)
            .ok_or_else(|| {
                Error::Characteristic(format!(
                    "characteristic not found: {} / {}",
                    service, characteristic
                ))
            })?;
        Ok((peripheral, found))
    }
}

impl Default for BtleplugBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for BtleplugBackend {
    async fn adapters(&self) -> Result<Vec<AdapterInfo>> {
        let manager = self.manager().await?;
        let adapters = manager
            .adapters()
            .await
            .map_err(|e| Error::BluetoothNotAvailable(e.to_string()))?;

        let mut infos = Vec::new();
        let mut known = self.adapters.write().await;
        for adapter in adapters {
            let raw = match adapter.adapter_info().await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping unresponsive adapter: {}", e);
                    continue;
                }
            };
            let info = parse_adapter_info(&raw);
            known.insert(info.identifier.clone(), adapter);
            infos.push(info);
        }
        Ok(infos)
    }

    async fn bluetooth_enabled(&self) -> Result<bool> {
        let manager = self.manager().await?;
        let adapters = manager
            .adapters()
            .await
            .map_err(|e| Error::BluetoothNotAvailable(e.to_string()))?;
        for adapter in adapters {
            if adapter.adapter_info().await.is_ok() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn scan_start(&self, adapter_id: &str, sink: DiscoverySink) -> Result<()> {
        let adapter = self.adapter_by_id(adapter_id).await?;

        // Take the event stream before starting so no sighting is missed.
        let mut events = adapter.events().await.map_err(scan_error)?;
        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(scan_error)?;

        let peripherals = Arc::clone(&self.peripherals);
        let event_adapter = adapter.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                let Ok(peripheral) = event_adapter.peripheral(&id).await else {
                    continue;
                };
                let Ok(Some(properties)) = peripheral.properties().await else {
                    continue;
                };
                let address = peripheral.address().to_string();
                peripherals
                    .write()
                    .await
                    .insert(address.clone(), peripheral.clone());
                sink.publish(snapshot_from_properties(address, &properties));
            }
            debug!("Discovery event stream ended");
        });

        if let Some(previous) = self
            .scan_tasks
            .write()
            .await
            .insert(adapter_id.to_string(), forwarder)
        {
            previous.abort();
        }
        Ok(())
    }

    async fn scan_stop(&self, adapter_id: &str) -> Result<()> {
        let adapter = self.adapter_by_id(adapter_id).await?;
        adapter.stop_scan().await.map_err(scan_error)?;
        if let Some(forwarder) = self.scan_tasks.write().await.remove(adapter_id) {
            forwarder.abort();
        }
        Ok(())
    }

    async fn connect(&self, address: &str) -> Result<()> {
        let peripheral = self.peripheral(address).await?;
        peripheral.connect().await.map_err(connection_error)
    }

    async fn disconnect(&self, address: &str) -> Result<()> {
        let peripheral = self.peripheral(address).await?;
        peripheral.disconnect().await.map_err(connection_error)
    }

    async fn is_connected(&self, address: &str) -> Result<bool> {
        let peripheral = self.peripheral(address).await?;
        peripheral.is_connected().await.map_err(connection_error)
    }

    async fn discover_services(&self, address: &str) -> Result<Vec<Service>> {
        let peripheral = self.peripheral(address).await?;
        peripheral.discover_services().await.map_err(gatt_error)?;

        // Advertised service data, where the platform captured any.
        let service_data = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .map(|p| p.service_data)
            .unwrap_or_default();

        let mut services = Vec::new();
        for service in peripheral.services() {
            let characteristics = service
                .characteristics
                .iter()
                .map(|c| Characteristic {
                    uuid: c.uuid.to_string(),
                    capabilities: capabilities_from_flags(c.properties),
                    descriptors: c
                        .descriptors
                        .iter()
                        .map(|d| Descriptor {
                            uuid: d.uuid.to_string(),
                            data: Vec::new(),
                        })
                        .collect(),
                })
                .collect();
            services.push(Service {
                uuid: service.uuid.to_string(),
                data: service_data.get(&service.uuid).cloned().unwrap_or_default(),
                characteristics,
            });
        }
        Ok(services)
    }

    async fn read(&self, address: &str, service: &str, characteristic: &str) -> Result<Vec<u8>> {
        let (peripheral, target) = self
            .find_characteristic(address, service, characteristic)
            .await?;
        peripheral.read(&target).await.map_err(gatt_error)
    }

    async fn write_request(
        &self,
        address: &str,
        service: &str,
        characteristic: &str,
        data: &[u8],
    ) -> Result<()> {
        let (peripheral, target) = self
            .find_characteristic(address, service, characteristic)
            .await?;
        peripheral
            .write(&target, data, WriteType::WithResponse)
            .await
            .map_err(gatt_error)
    }

    async fn write_command(
        &self,
        address: &str,
        service: &str,
        characteristic: &str,
        data: &[u8],
    ) -> Result<()> {
        let (peripheral, target) = self
            .find_characteristic(address, service, characteristic)
            .await?;
        peripheral
            .write(&target, data, WriteType::WithoutResponse)
            .await
            .map_err(gatt_error)
    }

    async fn subscribe(
        &self,
        address: &str,
        service: &str,
        characteristic: &str,
        kind: SubscriptionKind,
        sink: NotificationSink,
    ) -> Result<()> {
        let (peripheral, target) = self
            .find_characteristic(address, service, characteristic)
            .await?;

        // btleplug drives notify and indicate through the same CCCD write.
        peripheral.subscribe(&target).await.map_err(gatt_error)?;
        let mut notifications = peripheral.notifications().await.map_err(gatt_error)?;

        let target_uuid = target.uuid;
        let forwarder = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == target_uuid {
                    sink.publish(notification.value);
                }
            }
        });

        let key = (address.to_string(), characteristic.to_string());
        if let Some(previous) = self.subscription_tasks.write().await.insert(key, forwarder) {
            previous.abort();
        }
        debug!(
            "Subscribed ({:?}) to {} on {}",
            kind, characteristic, address
        );
        Ok(())
    }

    async fn unsubscribe(&self, address: &str, service: &str, characteristic: &str) -> Result<()> {
        let key = (address.to_string(), characteristic.to_string());
        if let Some(forwarder) = self.subscription_tasks.write().await.remove(&key) {
            forwarder.abort();
        }
        let (peripheral, target) = self
            .find_characteristic(address, service, characteristic)
            .await?;
        peripheral.unsubscribe(&target).await.map_err(gatt_error)
    }

    async fn read_descriptor(
        &self,
        address: &str,
        service: &str,
        characteristic: &str,
        descriptor: &str,
    ) -> Result<Vec<u8>> {
        let (peripheral, target) = self
            .find_characteristic(address, service, characteristic)
            .await?;
        let desc_uuid = parse_uuid(descriptor)?;
        let target_desc = target
            .descriptors
            .iter()
            .find(|d| d.uuid == desc_uuid)
            .ok_or_else(|| {
                Error::Characteristic(format!("descriptor not found: {}", descriptor))
            })?;
        peripheral
            .read_descriptor(target_desc)
            .await
            .map_err(gatt_error)
    }

    async fn write_descriptor(
        &self,
        address: &str,
        service: &str,
        characteristic: &str,
        descriptor: &str,
        data: &[u8],
    ) -> Result<()> {
        let (peripheral, target) = self
            .find_characteristic(address, service, characteristic)
            .await?;
        let desc_uuid = parse_uuid(descriptor)?;
        let target_desc = target
            .descriptors
            .iter()
            .find(|d| d.uuid == desc_uuid)
            .ok_or_else(|| {
                Error::Characteristic(format!("descriptor not found: {}", descriptor))
            })?;
        peripheral
            .write_descriptor(target_desc, data)
            .await
            .map_err(gatt_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_flag_translation() {
        let flags = CharPropFlags::READ | CharPropFlags::NOTIFY;
        let capabilities = capabilities_from_flags(flags);
        assert!(capabilities.contains(Capability::Read));
        assert!(capabilities.contains(Capability::Notify));
        assert!(!capabilities.contains(Capability::WriteRequest));
    }

    #[test]
    fn test_adapter_info_parsing() {
        let info = parse_adapter_info("hci0 (00:1A:7D:DA:71:13)");
        assert_eq!(info.identifier, "hci0");
        assert_eq!(info.address, "00:1A:7D:DA:71:13");

        let raw = parse_adapter_info("CoreBluetooth");
        assert_eq!(raw.identifier, "CoreBluetooth");
        assert_eq!(raw.address, "CoreBluetooth");
    }
}
