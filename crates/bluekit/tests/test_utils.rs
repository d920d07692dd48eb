//! Shared test collaborators
//!
//! `MockBackend` stands in for the native BLE stack so tests can script
//! discovery sightings, connection outcomes, GATT trees, and notification
//! payloads, and assert exactly which native calls were made.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use bluekit::{
    AdapterInfo, AddressType, Backend, Capabilities, Capability, Characteristic, Descriptor,
    DiscoverySink, Error, NotificationSink, PeripheralInfo, Result, Service, SubscriptionKind,
};

pub fn sighting(identifier: &str, address: &str, rssi: i16) -> PeripheralInfo {
    PeripheralInfo {
        identifier: identifier.to_string(),
        address: address.to_string(),
        address_type: AddressType::Public,
        rssi,
        tx_power: Some(4),
        mtu: Some(23),
        connectable: true,
        manufacturer_data: Vec::new(),
    }
}

pub fn characteristic(uuid: &str, capabilities: &[Capability]) -> Characteristic {
    Characteristic {
        uuid: uuid.to_string(),
        capabilities: capabilities.iter().copied().collect::<Capabilities>(),
        descriptors: vec![Descriptor {
            uuid: "00002902-0000-1000-8000-00805f9b34fb".to_string(),
            data: Vec::new(),
        }],
    }
}

pub fn service(uuid: &str, characteristics: Vec<Characteristic>) -> Service {
    Service {
        uuid: uuid.to_string(),
        data: Vec::new(),
        characteristics,
    }
}

/// Scriptable stand-in for the native stack.
pub struct MockBackend {
    pub adapters: Vec<AdapterInfo>,
    pub enabled: bool,
    /// Sightings replayed into the discovery sink on every `scan_start`
    pub sightings: Vec<PeripheralInfo>,
    /// Tree returned by `discover_services`
    pub services: Vec<Service>,
    /// Value returned by `read`
    pub read_value: Vec<u8>,
    /// Artificial latency for `connect`
    pub connect_delay: Option<Duration>,
    /// Number of initial `connect` attempts to reject
    pub reject_connects: AtomicUsize,

    calls: Mutex<Vec<String>>,
    writes: Mutex<Vec<(String, Vec<u8>)>>,
    discovery_sink: Mutex<Option<DiscoverySink>>,
    notification_sink: Mutex<Option<NotificationSink>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            adapters: vec![AdapterInfo {
                identifier: "mock0".to_string(),
                address: "00:00:00:00:00:01".to_string(),
            }],
            enabled: true,
            sightings: Vec::new(),
            services: Vec::new(),
            read_value: Vec::new(),
            connect_delay: None,
            reject_connects: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            discovery_sink: Mutex::new(None),
            notification_sink: Mutex::new(None),
        }
    }

    pub fn without_adapters() -> Self {
        let mut mock = Self::new();
        mock.adapters.clear();
        mock
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    /// Every backend call made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == name).count()
    }

    pub fn writes(&self) -> Vec<(String, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    /// The live discovery sink, for firing extra sightings mid-scan.
    pub fn discovery_sink(&self) -> Option<DiscoverySink> {
        self.discovery_sink.lock().unwrap().clone()
    }

    /// The live notification sink, for firing native notification callbacks.
    pub fn notification_sink(&self) -> Option<NotificationSink> {
        self.notification_sink.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn adapters(&self) -> Result<Vec<AdapterInfo>> {
        self.record("adapters");
        Ok(self.adapters.clone())
    }

    async fn bluetooth_enabled(&self) -> Result<bool> {
        self.record("bluetooth_enabled");
        Ok(self.enabled)
    }

    async fn scan_start(&self, _adapter: &str, sink: DiscoverySink) -> Result<()> {
        self.record("scan_start");
        for info in &self.sightings {
            sink.publish(info.clone());
        }
        *self.discovery_sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn scan_stop(&self, _adapter: &str) -> Result<()> {
        self.record("scan_stop");
        self.discovery_sink.lock().unwrap().take();
        Ok(())
    }

    async fn connect(&self, _address: &str) -> Result<()> {
        self.record("connect");
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        let remaining = self.reject_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.reject_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Connection("rejected by remote device".into()));
        }
        Ok(())
    }

    async fn disconnect(&self, _address: &str) -> Result<()> {
        self.record("disconnect");
        Ok(())
    }

    async fn is_connected(&self, _address: &str) -> Result<bool> {
        self.record("is_connected");
        Ok(true)
    }

    async fn discover_services(&self, _address: &str) -> Result<Vec<Service>> {
        self.record("discover_services");
        Ok(self.services.clone())
    }

    async fn read(&self, _address: &str, _service: &str, _characteristic: &str) -> Result<Vec<u8>> {
        self.record("read");
        Ok(self.read_value.clone())
    }

    async fn write_request(
        &self,
        _address: &str,
        _service: &str,
        characteristic: &str,
        data: &[u8],
    ) -> Result<()> {
        self.record("write_request");
        self.writes
            .lock()
            .unwrap()
            .push((characteristic.to_string(), data.to_vec()));
        Ok(())
    }

    async fn write_command(
        &self,
        _address: &str,
        _service: &str,
        characteristic: &str,
        data: &[u8],
    ) -> Result<()> {
        self.record("write_command");
        self.writes
            .lock()
            .unwrap()
            .push((characteristic.to_string(), data.to_vec()));
        Ok(())
    }

    async fn subscribe(
        &self,
        _address: &str,
        _service: &str,
        _characteristic: &str,
        _kind: SubscriptionKind,
        sink: NotificationSink,
    ) -> Result<()> {
        self.record("subscribe");
        *self.notification_sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn unsubscribe(&self, _address: &str, _service: &str, _characteristic: &str) -> Result<()> {
        self.record("unsubscribe");
        Ok(())
    }

    async fn read_descriptor(
        &self,
        _address: &str,
        _service: &str,
        _characteristic: &str,
        _descriptor: &str,
    ) -> Result<Vec<u8>> {
        self.record("read_descriptor");
        Ok(vec![0x00, 0x29])
    }

    async fn write_descriptor(
        &self,
        _address: &str,
        _service: &str,
        _characteristic: &str,
        descriptor: &str,
        data: &[u8],
    ) -> Result<()> {
        self.record("write_descriptor");
        self.writes
            .lock()
            .unwrap()
            .push((descriptor.to_string(), data.to_vec()));
        Ok(())
    }
}
