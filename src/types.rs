use crate::error::RokuError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Capability metadata parsed from the device's self-description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapabilities {
    /// Name the user gave the device, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    /// Marketing model name (e.g. "Roku Ultra")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    /// Model number (e.g. "4800X")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_number: Option<String>,

    /// The device is a TV rather than a streaming stick or box
    #[serde(default)]
    pub is_display: bool,

    /// Commands are refused until the user authorizes this client on screen
    #[serde(default)]
    pub requires_pairing: bool,
}

/// The currently known device
///
/// Records are never mutated in place; the registry swaps whole records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub address: Ipv4Addr,
    pub capabilities: DeviceCapabilities,
    /// Last successful probe
    pub last_verified_at: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    /// A record for a device that answered a probe just now
    pub fn verified(address: Ipv4Addr, capabilities: DeviceCapabilities) -> Self {
        Self {
            address,
            capabilities,
            last_verified_at: Some(Utc::now()),
        }
    }

    /// Human-readable label for status lines
    pub fn label(&self) -> String {
        let caps = &self.capabilities;
        match caps.device_name.as_deref().or(caps.model_name.as_deref()) {
            Some(name) => format!("{name} ({})", self.address),
            None => self.address.to_string(),
        }
    }
}

/// Outcome of probing a single address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub address: Ipv4Addr,
    pub outcome: Result<DeviceCapabilities, RokuError>,
}

impl ProbeResult {
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn capabilities(&self) -> Option<&DeviceCapabilities> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&RokuError> {
        self.outcome.as_ref().err()
    }
}
