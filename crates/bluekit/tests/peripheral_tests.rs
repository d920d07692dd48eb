//! Peripheral lifecycle and metadata behavior

mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use bluekit::{
    AdapterRegistry, AddressType, ClientConfig, ConnectionState, Error, Peripheral,
};
use test_utils::{sighting, MockBackend};

const ADDR: &str = "AA:AA:AA:AA:AA:AA";

async fn discovered(mock: &Arc<MockBackend>, config: ClientConfig) -> Peripheral {
    let registry = AdapterRegistry::with_backend(Arc::clone(mock) as _)
        .with_config(config);
    let adapters = registry.adapters().await.unwrap();
    let results = adapters[0].scan_for(Duration::from_millis(10)).await.unwrap();
    results
        .into_iter()
        .find(|p| p.address() == ADDR)
        .expect("scripted sighting missing from scan results")
}

fn mock_with_device() -> Arc<MockBackend> {
    let mut mock = MockBackend::new();
    mock.sightings = vec![sighting("Thermometer", ADDR, -40)];
    Arc::new(mock)
}

#[tokio::test]
async fn test_connect_transitions_and_is_idempotent_when_connected() {
    let mock = mock_with_device();
    let peripheral = discovered(&mock, ClientConfig::default()).await;

    assert_eq!(peripheral.state(), ConnectionState::Discovered);
    assert!(!peripheral.is_connected());

    peripheral.connect().await.unwrap();
    assert_eq!(peripheral.state(), ConnectionState::Connected);
    assert!(peripheral.is_connected());

    // Connecting again does not touch the native stack a second time.
    peripheral.connect().await.unwrap();
    assert_eq!(mock.call_count("connect"), 1);
}

#[tokio::test]
async fn test_connection_rejection_is_recoverable() {
    let mock = mock_with_device();
    mock.reject_connects.store(1, std::sync::atomic::Ordering::SeqCst);
    let peripheral = discovered(&mock, ClientConfig::default()).await;

    let err = peripheral.connect().await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
    assert_eq!(peripheral.state(), ConnectionState::Disconnected);

    // Retrying after rejection succeeds.
    peripheral.connect().await.unwrap();
    assert_eq!(peripheral.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_concurrent_connect_is_rejected_not_dropped() {
    let mut mock = MockBackend::new();
    mock.sightings = vec![sighting("Thermometer", ADDR, -40)];
    mock.connect_delay = Some(Duration::from_millis(200));
    let mock = Arc::new(mock);
    let peripheral = discovered(&mock, ClientConfig::default()).await;

    let first = {
        let peripheral = peripheral.clone();
        tokio::spawn(async move { peripheral.connect().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = peripheral.connect().await.unwrap_err();
    match second {
        Error::Connection(reason) => assert!(reason.contains("in progress")),
        other => panic!("expected Connection error, got {:?}", other),
    }

    first.await.unwrap().unwrap();
    assert_eq!(peripheral.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_connect_timeout_returns_to_disconnected() {
    let mut mock = MockBackend::new();
    mock.sightings = vec![sighting("Thermometer", ADDR, -40)];
    mock.connect_delay = Some(Duration::from_secs(30));
    let mock = Arc::new(mock);
    let config = ClientConfig::new().with_connection_timeout(Duration::from_millis(50));
    let peripheral = discovered(&mock, config).await;

    let err = peripheral.connect().await.unwrap_err();
    assert!(matches!(err, Error::Timeout));
    assert_eq!(peripheral.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let mock = mock_with_device();
    let peripheral = discovered(&mock, ClientConfig::default()).await;

    // Never connected: a no-op, not an error, and no native call.
    peripheral.disconnect().await.unwrap();
    assert_eq!(mock.call_count("disconnect"), 0);

    peripheral.connect().await.unwrap();
    peripheral.disconnect().await.unwrap();
    assert_eq!(peripheral.state(), ConnectionState::Disconnected);

    peripheral.disconnect().await.unwrap();
    assert_eq!(mock.call_count("disconnect"), 1);
}

#[tokio::test]
async fn test_name_falls_back_to_address() {
    let mut mock = MockBackend::new();
    mock.sightings = vec![sighting("", ADDR, -40)];
    let mock = Arc::new(mock);
    let peripheral = discovered(&mock, ClientConfig::default()).await;

    assert_eq!(peripheral.name(), ADDR);
    assert!(!peripheral.has_data());
    assert_eq!(peripheral.to_string(), format!("{} ({})", ADDR, ADDR));
}

#[tokio::test]
async fn test_display_helpers() {
    let mock = mock_with_device();
    let peripheral = discovered(&mock, ClientConfig::default()).await;

    assert_eq!(peripheral.name(), "Thermometer");
    assert!(peripheral.has_data());
    assert_eq!(peripheral.rssi_display(), "-40 dBm");
    assert_eq!(peripheral.tx_power_display().as_deref(), Some("4 dBm"));
    assert_eq!(peripheral.mtu_display().as_deref(), Some("23 bytes"));
    assert_eq!(peripheral.address_type_display(), "Public");
    assert!(peripheral.is_connectable());
}

#[test]
fn test_address_type_symbolic_codes() {
    assert_eq!(AddressType::from(0).to_string(), "Public");
    assert_eq!(AddressType::from(1).to_string(), "Random");
    assert_eq!(AddressType::from(2).to_string(), "Unspecified");
}

proptest! {
    #[test]
    fn unrecognized_address_codes_render_as_unknown(code in 3u8..) {
        let rendered = AddressType::from(code).to_string();
        prop_assert_eq!(rendered, format!("Unknown({})", code));
    }
}
