//! Client configuration

use std::time::Duration;

use crate::adapter::DEFAULT_SCAN_TIMEOUT;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Timeouts applied by the client layer.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ClientConfig {
    /// Duration of a timed scan when the caller does not pass one
    /// ([`Adapter::scan_for_default`](crate::adapter::Adapter::scan_for_default))
    pub scan_timeout: Duration,
    /// Maximum time to wait for a connection attempt
    pub connection_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default timed-scan duration
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the connection attempt timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.scan_timeout, DEFAULT_SCAN_TIMEOUT);
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new()
            .with_scan_timeout(Duration::from_millis(100))
            .with_connection_timeout(Duration::from_secs(1));
        assert_eq!(config.scan_timeout, Duration::from_millis(100));
        assert_eq!(config.connection_timeout, Duration::from_secs(1));
    }
}
