//! Peripheral identity and connection lifecycle
//!
//! A [`PeripheralInfo`] is the immutable advertisement snapshot produced by a
//! scan. A [`Peripheral`] wraps one snapshot together with the backend handle
//! and the connection state machine:
//!
//! ```text
//! Discovered ──connect()──▶ Connecting ──▶ Connected
//!      ▲                        │               │
//!      │                     failure       disconnect()
//!      │                        ▼               ▼
//!      └──────(rescan)───── Disconnected ◀──────┘
//! ```
//!
//! Connection rejection by the remote device is recoverable: the peripheral
//! lands back in `Disconnected` and `connect()` may be retried.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::time::timeout;
use tracing::{debug, info};

use crate::backend::Backend;
use crate::characteristic::CharacteristicChannel;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::gatt::{find_service, Characteristic, Service};

// ----------------------------------------------------------------------------
// Address Type
// ----------------------------------------------------------------------------

/// BLE address type as reported in the advertisement.
///
/// Unrecognized numeric codes from the native stack are preserved as
/// [`AddressType::Unknown`] rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Public,
    Random,
    Unspecified,
    Unknown(u8),
}

impl From<u8> for AddressType {
    fn from(code: u8) -> Self {
        match code {
            0 => AddressType::Public,
            1 => AddressType::Random,
            2 => AddressType::Unspecified,
            n => AddressType::Unknown(n),
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressType::Public => f.write_str("Public"),
            AddressType::Random => f.write_str("Random"),
            AddressType::Unspecified => f.write_str("Unspecified"),
            AddressType::Unknown(n) => write!(f, "Unknown({})", n),
        }
    }
}

// ----------------------------------------------------------------------------
// Advertisement Snapshot
// ----------------------------------------------------------------------------

/// Immutable snapshot of one advertisement sighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralInfo {
    /// Advertised name; may be empty
    pub identifier: String,
    /// MAC address or platform UUID; unique key within a scan result set
    pub address: String,
    pub address_type: AddressType,
    /// Signal strength in dBm, valid while the advertisement is fresh
    pub rssi: i16,
    /// Advertised transmit power in dBm, when present
    pub tx_power: Option<i16>,
    /// Negotiated MTU in bytes, when the stack reports one
    pub mtu: Option<u16>,
    pub connectable: bool,
    /// Manufacturer-specific advertisement data, keyed by company identifier
    pub manufacturer_data: Vec<(u16, Vec<u8>)>,
}

// ----------------------------------------------------------------------------
// Connection State Machine
// ----------------------------------------------------------------------------

/// Lifecycle state of a peripheral session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Discovered,
    Connecting,
    Connected,
    Disconnected,
}

struct PeripheralInner {
    backend: Arc<dyn Backend>,
    config: ClientConfig,
    info: PeripheralInfo,
    state: Mutex<ConnectionState>,
    /// GATT tree cache; populated lazily, valid for the life of one
    /// connection, cleared on reconnect and disconnect
    gatt: tokio::sync::RwLock<Option<Vec<Service>>>,
}

/// A discovered BLE peripheral and its connection session.
///
/// Cloning is cheap and shares the session: clones observe the same
/// connection state and GATT cache.
#[derive(Clone)]
pub struct Peripheral {
    inner: Arc<PeripheralInner>,
}

impl Peripheral {
    pub(crate) fn new(backend: Arc<dyn Backend>, config: ClientConfig, info: PeripheralInfo) -> Self {
        Self {
            inner: Arc::new(PeripheralInner {
                backend,
                config,
                info,
                state: Mutex::new(ConnectionState::Discovered),
                gatt: tokio::sync::RwLock::new(None),
            }),
        }
    }

    pub(crate) fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    // ------------------------------------------------------------------
    // Metadata accessors
    // ------------------------------------------------------------------

    pub fn identifier(&self) -> &str {
        &self.inner.info.identifier
    }

    pub fn address(&self) -> &str {
        &self.inner.info.address
    }

    pub fn address_type(&self) -> AddressType {
        self.inner.info.address_type
    }

    pub fn rssi(&self) -> i16 {
        self.inner.info.rssi
    }

    pub fn tx_power(&self) -> Option<i16> {
        self.inner.info.tx_power
    }

    pub fn mtu(&self) -> Option<u16> {
        self.inner.info.mtu
    }

    pub fn manufacturer_data(&self) -> &[(u16, Vec<u8>)] {
        &self.inner.info.manufacturer_data
    }

    /// Advertised name, falling back to the address when empty.
    pub fn name(&self) -> &str {
        if self.inner.info.identifier.is_empty() {
            &self.inner.info.address
        } else {
            &self.inner.info.identifier
        }
    }

    /// Whether the snapshot carries both an identifier and an address.
    pub fn has_data(&self) -> bool {
        !self.inner.info.identifier.is_empty() && !self.inner.info.address.is_empty()
    }

    // ------------------------------------------------------------------
    // Display helpers (no semantic effect)
    // ------------------------------------------------------------------

    pub fn rssi_display(&self) -> String {
        format!("{} dBm", self.inner.info.rssi)
    }

    pub fn tx_power_display(&self) -> Option<String> {
        self.inner.info.tx_power.map(|p| format!("{} dBm", p))
    }

    pub fn mtu_display(&self) -> Option<String> {
        self.inner.info.mtu.map(|m| format!("{} bytes", m))
    }

    pub fn address_type_display(&self) -> String {
        self.inner.info.address_type.to_string()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_connectable(&self) -> bool {
        self.inner.info.connectable
    }

    /// Establish a connection.
    ///
    /// Only one attempt may be in flight at a time; a concurrent call while
    /// `Connecting` is rejected with [`Error::Connection`] rather than
    /// silently dropped. Calling on an already connected peripheral is a
    /// no-op. On failure or timeout the peripheral returns to
    /// `Disconnected`, from which `connect()` may be retried.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match *state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting => {
                    return Err(Error::Connection(
                        "connection attempt already in progress".into(),
                    ))
                }
                ConnectionState::Discovered | ConnectionState::Disconnected => {
                    *state = ConnectionState::Connecting;
                }
            }
        }

        let address = &self.inner.info.address;
        let attempt = timeout(
            self.inner.config.connection_timeout,
            self.inner.backend.connect(address),
        )
        .await;

        match attempt {
            Ok(Ok(())) => {
                // New session: any tree cached from a previous connection is
                // stale.
                *self.inner.gatt.write().await = None;
                self.set_state(ConnectionState::Connected);
                info!("Connected to {}", address);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Disconnected);
                debug!("Connection to {} failed: {}", address, e);
                Err(e)
            }
            Err(_) => {
                self.set_state(ConnectionState::Disconnected);
                debug!("Connection to {} timed out", address);
                Err(Error::Timeout)
            }
        }
    }

    /// Tear down the connection. A no-op when not connected.
    pub async fn disconnect(&self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }

        let address = &self.inner.info.address;
        let result = self.inner.backend.disconnect(address).await;

        // The session is invalidated regardless of how the native call went.
        self.set_state(ConnectionState::Disconnected);
        *self.inner.gatt.write().await = None;

        result?;
        info!("Disconnected from {}", address);
        Ok(())
    }

    // ------------------------------------------------------------------
    // GATT tree
    // ------------------------------------------------------------------

    /// The service hierarchy of the connected peripheral.
    ///
    /// Discovered from the device on first access and cached for the life of
    /// the connection; a reconnect invalidates the cache.
    pub async fn services(&self) -> Result<Vec<Service>> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        if let Some(tree) = self.inner.gatt.read().await.as_ref() {
            return Ok(tree.clone());
        }

        let mut slot = self.inner.gatt.write().await;
        if let Some(tree) = slot.as_ref() {
            return Ok(tree.clone());
        }

        let address = &self.inner.info.address;
        let tree = self.inner.backend.discover_services(address).await?;
        debug!("Discovered {} services on {}", tree.len(), address);
        *slot = Some(tree.clone());
        Ok(tree)
    }

    /// First service matching `uuid`, or `Ok(None)` on a miss.
    pub async fn service(&self, uuid: &str) -> Result<Option<Service>> {
        let services = self.services().await?;
        Ok(find_service(&services, uuid).cloned())
    }

    /// Composed service/characteristic lookup; `Ok(None)` if either level
    /// misses.
    pub async fn characteristic(
        &self,
        service_uuid: &str,
        char_uuid: &str,
    ) -> Result<Option<Characteristic>> {
        let services = self.services().await?;
        Ok(find_service(&services, service_uuid)
            .and_then(|s| s.characteristic(char_uuid))
            .cloned())
    }

    /// Capability-gated I/O handle for one characteristic.
    pub async fn characteristic_channel(
        &self,
        service_uuid: &str,
        char_uuid: &str,
    ) -> Result<CharacteristicChannel> {
        let characteristic = self
            .characteristic(service_uuid, char_uuid)
            .await?
            .ok_or_else(|| {
                Error::Characteristic(format!(
                    "characteristic not found: {} / {}",
                    service_uuid, char_uuid
                ))
            })?;
        Ok(CharacteristicChannel::new(
            self.clone(),
            service_uuid.to_string(),
            characteristic,
        ))
    }

    // ------------------------------------------------------------------
    // Descriptor I/O
    // ------------------------------------------------------------------

    /// Read a descriptor value.
    pub async fn read_descriptor(
        &self,
        service_uuid: &str,
        char_uuid: &str,
        desc_uuid: &str,
    ) -> Result<Vec<u8>> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.inner
            .backend
            .read_descriptor(&self.inner.info.address, service_uuid, char_uuid, desc_uuid)
            .await
    }

    /// Write a descriptor value.
    pub async fn write_descriptor(
        &self,
        service_uuid: &str,
        char_uuid: &str,
        desc_uuid: &str,
        data: &[u8],
    ) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.inner
            .backend
            .write_descriptor(
                &self.inner.info.address,
                service_uuid,
                char_uuid,
                desc_uuid,
                data,
            )
            .await
    }
}

impl fmt::Display for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.address())
    }
}

impl fmt::Debug for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peripheral")
            .field("info", &self.inner.info)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_type_mapping() {
        assert_eq!(AddressType::from(0), AddressType::Public);
        assert_eq!(AddressType::from(1), AddressType::Random);
        assert_eq!(AddressType::from(2), AddressType::Unspecified);
        assert_eq!(AddressType::from(7), AddressType::Unknown(7));
    }

    #[test]
    fn test_address_type_rendering() {
        assert_eq!(AddressType::Public.to_string(), "Public");
        assert_eq!(AddressType::Random.to_string(), "Random");
        assert_eq!(AddressType::Unspecified.to_string(), "Unspecified");
        assert_eq!(AddressType::Unknown(42).to_string(), "Unknown(42)");
    }
}
