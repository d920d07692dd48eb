//! Error taxonomy for BLE client operations

use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors surfaced by the BLE client layer.
///
/// Native stack failures are mapped one-to-one into the nearest kind at the
/// backend boundary and re-raised unmodified; the library never retries on
/// the caller's behalf. [`Error::Connection`] is recoverable; a rejected
/// connection attempt may simply be retried.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Operation not supported on this platform")]
    NotSupported,

    #[error("Bluetooth not available: {0}")]
    BluetoothNotAvailable(String),

    #[error("Peripheral not connected")]
    NotConnected,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Scan failed: {0}")]
    Scan(String),

    #[error("Characteristic operation failed: {0}")]
    Characteristic(String),

    #[error("Operation timed out")]
    Timeout,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
