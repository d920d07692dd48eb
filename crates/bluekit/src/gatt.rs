//! GATT hierarchy records
//!
//! Services, characteristics, and descriptors are immutable snapshots taken
//! at discovery time. The tree is cached on the owning peripheral for the
//! life of the connection and rebuilt after a reconnect.

use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;

use crate::error::Error;

// ----------------------------------------------------------------------------
// Capabilities
// ----------------------------------------------------------------------------

/// A single declared capability of a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    WriteRequest,
    WriteCommand,
    Notify,
    Indicate,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::Read => "read",
            Capability::WriteRequest => "write",
            Capability::WriteCommand => "write-without-response",
            Capability::Notify => "notify",
            Capability::Indicate => "indicate",
        };
        f.write_str(s)
    }
}

impl FromStr for Capability {
    type Err = Error;

    /// Parse a capability label as reported by a native stack. Unknown
    /// labels are rejected at the boundary instead of being carried around
    /// as raw strings.
    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "read" => Ok(Capability::Read),
            "write" => Ok(Capability::WriteRequest),
            "write-without-response" => Ok(Capability::WriteCommand),
            "notify" => Ok(Capability::Notify),
            "indicate" => Ok(Capability::Indicate),
            other => Err(Error::Characteristic(format!(
                "unknown capability: {}",
                other
            ))),
        }
    }
}

/// The capability set declared by a characteristic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(SmallVec<[Capability; 5]>);

impl Capabilities {
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    pub fn insert(&mut self, capability: Capability) {
        if !self.0.contains(&capability) {
            self.0.push(capability);
        }
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = Capabilities::new();
        for capability in iter {
            set.insert(capability);
        }
        set
    }
}

// ----------------------------------------------------------------------------
// GATT Records
// ----------------------------------------------------------------------------

/// A GATT service with its characteristics in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub uuid: String,
    /// Opaque service data from the advertisement, if any
    pub data: Vec<u8>,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    /// First characteristic matching `uuid` exactly, in discovery order.
    pub fn characteristic(&self, uuid: &str) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// A GATT characteristic with its declared capabilities and descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub uuid: String,
    pub capabilities: Capabilities,
    pub descriptors: Vec<Descriptor>,
}

impl Characteristic {
    pub fn can_read(&self) -> bool {
        self.capabilities.contains(Capability::Read)
    }

    pub fn can_write_request(&self) -> bool {
        self.capabilities.contains(Capability::WriteRequest)
    }

    pub fn can_write_command(&self) -> bool {
        self.capabilities.contains(Capability::WriteCommand)
    }

    pub fn can_notify(&self) -> bool {
        self.capabilities.contains(Capability::Notify)
    }

    pub fn can_indicate(&self) -> bool {
        self.capabilities.contains(Capability::Indicate)
    }
}

/// A GATT descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub uuid: String,
    pub data: Vec<u8>,
}

/// First service matching `uuid` exactly, in discovery order. Duplicate
/// UUIDs resolve to the earliest entry (stable, deterministic).
pub(crate) fn find_service<'a>(services: &'a [Service], uuid: &str) -> Option<&'a Service> {
    services.iter().find(|s| s.uuid == uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_labels_round_trip() {
        for capability in [
            Capability::Read,
            Capability::WriteRequest,
            Capability::WriteCommand,
            Capability::Notify,
            Capability::Indicate,
        ] {
            let parsed: Capability = capability.to_string().parse().unwrap();
            assert_eq!(parsed, capability);
        }
    }

    #[test]
    fn test_unknown_capability_rejected() {
        let err = "reliable-write".parse::<Capability>().unwrap_err();
        assert!(matches!(err, Error::Characteristic(_)));
    }

    #[test]
    fn test_capabilities_deduplicate() {
        let mut set = Capabilities::new();
        set.insert(Capability::Read);
        set.insert(Capability::Read);
        assert_eq!(set.iter().count(), 1);
        assert!(set.contains(Capability::Read));
        assert!(!set.contains(Capability::Notify));
    }

    #[test]
    fn test_first_match_wins_on_duplicate_uuids() {
        let services = vec![
            Service {
                uuid: "180f".into(),
                data: vec![1],
                characteristics: vec![],
            },
            Service {
                uuid: "180f".into(),
                data: vec![2],
                characteristics: vec![],
            },
        ];
        let found = find_service(&services, "180f").unwrap();
        assert_eq!(found.data, vec![1]);
        assert!(find_service(&services, "1800").is_none());
    }
}
