//! Cross-platform Bluetooth Low Energy central client abstraction
//!
//! A thin object model and lifecycle manager over a native BLE stack:
//! adapter enumeration, scan sessions with accumulating result sets,
//! peripheral connection lifecycle, lazy GATT discovery, and
//! capability-gated characteristic I/O, with invalid operations (writing a
//! non-writable characteristic, touching a disconnected peripheral) rejected
//! before they ever reach the native stack.
//!
//! ## Architecture
//!
//! - [`error`] - The error taxonomy every other module reports through
//! - [`config`] - Client timeouts
//! - [`backend`] - The native stack seam and its btleplug implementation
//! - [`adapter`] - Adapter enumeration and scan control
//! - `scan` (internal) - Scan session state machine
//! - [`peripheral`] - Discovered devices and the connection state machine
//! - [`gatt`] - Service/characteristic/descriptor records and capabilities
//! - [`characteristic`] - Capability-gated read/write/notify channel
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use bluekit::{scan, AdapterRegistry};
//!
//! # async fn example() -> bluekit::Result<()> {
//! let registry = AdapterRegistry::new();
//!
//! // One-shot scan on the first adapter.
//! for peripheral in scan(&registry, Duration::from_millis(5000)).await? {
//!     println!("{} [{}]", peripheral, peripheral.rssi_display());
//! }
//!
//! // Or drive a session by hand.
//! let adapters = registry.adapters().await?;
//! let adapter = &adapters[0];
//! adapter.scan_start().await?;
//! // ... poll adapter.scan_results() at will ...
//! adapter.scan_stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod backend;
pub mod characteristic;
pub mod config;
pub mod error;
pub mod gatt;
pub mod peripheral;

mod scan;

// Public API exports
pub use adapter::{scan, Adapter, AdapterRegistry, DEFAULT_SCAN_TIMEOUT};
pub use backend::{AdapterInfo, Backend, DiscoverySink, NotificationSink, SubscriptionKind};
pub use characteristic::CharacteristicChannel;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use gatt::{Capabilities, Capability, Characteristic, Descriptor, Service};
pub use peripheral::{AddressType, ConnectionState, Peripheral, PeripheralInfo};
