//! Native stack seam
//!
//! [`Backend`] is the boundary between the client object model and the
//! platform BLE stack. The production implementation sits on btleplug
//! ([`BtleplugBackend`](btleplug::BtleplugBackend)); tests drive the same
//! trait with a stub, which is what lets capability checks be verified as
//! side-effect free.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::characteristic::SubscriptionGuard;
use crate::error::Result;
use crate::gatt::Service;
use crate::peripheral::PeripheralInfo;

pub mod btleplug;

// ----------------------------------------------------------------------------
// Adapter Record
// ----------------------------------------------------------------------------

/// Identity of a radio as reported by the native stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// Platform name of the radio
    pub identifier: String,
    /// MAC address or platform UUID
    pub address: String,
}

// ----------------------------------------------------------------------------
// Event Sinks
// ----------------------------------------------------------------------------

/// Receiving end of the stack-owned discovery path.
///
/// The backend calls [`publish`](Self::publish) from its event delivery
/// context for every advertisement sighting. Publishing upserts the snapshot
/// keyed by address: a later sighting of the same address replaces the
/// earlier one. The upsert completes before `publish` returns, so a
/// subsequent read of the result set always reflects it.
#[derive(Clone)]
pub struct DiscoverySink {
    results: Arc<Mutex<HashMap<String, PeripheralInfo>>>,
}

impl DiscoverySink {
    pub(crate) fn new(results: Arc<Mutex<HashMap<String, PeripheralInfo>>>) -> Self {
        Self { results }
    }

    /// Record one advertisement sighting.
    pub fn publish(&self, info: PeripheralInfo) {
        let mut results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        results.insert(info.address.clone(), info);
    }
}

/// Receiving end of one characteristic subscription.
///
/// The backend calls [`publish`](Self::publish) for each notification or
/// indication payload, in arrival order. Delivery stops permanently once the
/// owning subscription is cancelled, even if the backend keeps publishing.
#[derive(Clone)]
pub struct NotificationSink {
    guard: Arc<SubscriptionGuard>,
}

impl NotificationSink {
    pub(crate) fn new(guard: Arc<SubscriptionGuard>) -> Self {
        Self { guard }
    }

    /// Deliver one payload to the subscriber, unless cancelled.
    pub fn publish(&self, data: Vec<u8>) {
        self.guard.deliver(data);
    }
}

/// Which push mechanism a subscription uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Notify,
    Indicate,
}

// ----------------------------------------------------------------------------
// Backend Trait
// ----------------------------------------------------------------------------

/// Primitive operations supplied by the native BLE stack.
///
/// Errors returned from these methods are already mapped to the taxonomy in
/// [`crate::Error`]; the client layer propagates them unmodified.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Enumerate available radios. An empty list is a valid result, not an
    /// error.
    async fn adapters(&self) -> Result<Vec<AdapterInfo>>;

    /// Whether Bluetooth is enabled on the system.
    async fn bluetooth_enabled(&self) -> Result<bool>;

    /// Start scanning on the given adapter, delivering sightings to `sink`
    /// until [`scan_stop`](Self::scan_stop).
    async fn scan_start(&self, adapter: &str, sink: DiscoverySink) -> Result<()>;

    /// Stop scanning on the given adapter.
    async fn scan_stop(&self, adapter: &str) -> Result<()>;

    /// Connect to the peripheral at `address`. Blocks until the native stack
    /// reports success or failure; the caller applies its own timeout.
    async fn connect(&self, address: &str) -> Result<()>;

    /// Disconnect from the peripheral at `address`.
    async fn disconnect(&self, address: &str) -> Result<()>;

    /// Whether the native stack considers `address` connected.
    async fn is_connected(&self, address: &str) -> Result<bool>;

    /// Discover the full service/characteristic/descriptor hierarchy.
    async fn discover_services(&self, address: &str) -> Result<Vec<Service>>;

    /// Read a characteristic value.
    async fn read(&self, address: &str, service: &str, characteristic: &str) -> Result<Vec<u8>>;

    /// Write with acknowledgment.
    async fn write_request(
        &self,
        address: &str,
        service: &str,
        characteristic: &str,
        data: &[u8],
    ) -> Result<()>;

    /// Write without acknowledgment (fire-and-forget).
    async fn write_command(
        &self,
        address: &str,
        service: &str,
        characteristic: &str,
        data: &[u8],
    ) -> Result<()>;

    /// Subscribe to notifications or indications, delivering payloads to
    /// `sink` in arrival order.
    async fn subscribe(
        &self,
        address: &str,
        service: &str,
        characteristic: &str,
        kind: SubscriptionKind,
        sink: NotificationSink,
    ) -> Result<()>;

    /// Tear down a subscription at the native layer.
    async fn unsubscribe(&self, address: &str, service: &str, characteristic: &str) -> Result<()>;

    /// Read a descriptor value.
    async fn read_descriptor(
        &self,
        address: &str,
        service: &str,
        characteristic: &str,
        descriptor: &str,
    ) -> Result<Vec<u8>>;

    /// Write a descriptor value.
    async fn write_descriptor(
        &self,
        address: &str,
        service: &str,
        characteristic: &str,
        descriptor: &str,
        data: &[u8],
    ) -> Result<()>;
}
