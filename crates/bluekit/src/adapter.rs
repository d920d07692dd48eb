//! Adapter enumeration and scan control

use std::sync::Arc;
use std::time::Duration;

use crate::backend::btleplug::BtleplugBackend;
use crate::backend::{AdapterInfo, Backend};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::peripheral::Peripheral;
use crate::scan::ScanSession;

/// Default value of [`ClientConfig::scan_timeout`].
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_millis(5000);

// ----------------------------------------------------------------------------
// Adapter
// ----------------------------------------------------------------------------

/// One physical or logical radio, owning its scan session.
pub struct Adapter {
    info: AdapterInfo,
    session: ScanSession,
}

impl Adapter {
    pub(crate) fn new(backend: Arc<dyn Backend>, config: ClientConfig, info: AdapterInfo) -> Self {
        let session = ScanSession::new(backend, config, info.identifier.clone());
        Self { info, session }
    }

    /// Platform name of the radio.
    pub fn identifier(&self) -> &str {
        &self.info.identifier
    }

    /// MAC address or platform UUID of the radio.
    pub fn address(&self) -> &str {
        &self.info.address
    }

    /// Start a continuous scan. Benign no-op when already scanning.
    pub async fn scan_start(&self) -> Result<()> {
        self.session.start().await
    }

    /// Stop the scan. No-op when idle.
    pub async fn scan_stop(&self) -> Result<()> {
        self.session.stop().await
    }

    /// Blocking timed scan returning the final result set.
    pub async fn scan_for(&self, duration: Duration) -> Result<Vec<Peripheral>> {
        self.session.scan_for(duration).await
    }

    /// Timed scan using the configured `scan_timeout`
    /// ([`ClientConfig::scan_timeout`]).
    pub async fn scan_for_default(&self) -> Result<Vec<Peripheral>> {
        self.session.scan_for_default().await
    }

    /// Whether a scan is currently running. Pure observation.
    pub fn scan_active(&self) -> bool {
        self.session.is_active()
    }

    /// The accumulating result set: partial while scanning, final after a
    /// stop. Entries are unique per address; a later sighting of an address
    /// replaces the earlier snapshot.
    pub fn scan_results(&self) -> Vec<Peripheral> {
        self.session.results()
    }
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

/// Entry point for adapter enumeration.
///
/// Wraps a [`Backend`]; [`AdapterRegistry::new`] selects the btleplug-based
/// platform backend, [`AdapterRegistry::with_backend`] makes the dependency
/// explicit (used by the test suite).
pub struct AdapterRegistry {
    backend: Arc<dyn Backend>,
    config: ClientConfig,
}

impl AdapterRegistry {
    /// Registry over the platform BLE stack.
    pub fn new() -> Self {
        Self::with_backend(Arc::new(BtleplugBackend::new()))
    }

    /// Registry over an explicit backend.
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            config: ClientConfig::default(),
        }
    }

    /// Replace the client configuration.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// The configuration handed to every adapter and peripheral.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Enumerate available radios. An empty list is a valid result; this
    /// never fails for lack of adapters.
    pub async fn adapters(&self) -> Result<Vec<Adapter>> {
        let infos = self.backend.adapters().await?;
        Ok(infos
            .into_iter()
            .map(|info| Adapter::new(Arc::clone(&self.backend), self.config.clone(), info))
            .collect())
    }

    /// Whether Bluetooth is enabled on the system.
    pub async fn bluetooth_enabled(&self) -> Result<bool> {
        self.backend.bluetooth_enabled().await
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience scan: a timed scan on the first available adapter.
///
/// This is the only place where an empty adapter list becomes an error
/// ([`Error::BluetoothNotAvailable`]).
pub async fn scan(registry: &AdapterRegistry, timeout: Duration) -> Result<Vec<Peripheral>> {
    let adapters = registry.adapters().await?;
    let Some(adapter) = adapters.first() else {
        return Err(Error::BluetoothNotAvailable(
            "no Bluetooth adapters found".into(),
        ));
    };
    adapter.scan_for(timeout).await
}
