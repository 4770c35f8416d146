use crate::addresses::{SubnetPrefix, DEFAULT_FALLBACK_PREFIXES};
use crate::protocol::CONTROL_PORT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors loading an [`EngineConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine tunables
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// batch_size = 50
/// batch_timeout_ms = 1500
/// fallback_prefixes = ["192.168.50", "10.0.0"]
/// relay_url = "https://remote.example.com/roku"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Device control port
    pub control_port: u16,

    /// Addresses probed concurrently per batch
    pub batch_size: usize,

    /// Shared deadline for one batch
    #[serde(rename = "batch_timeout_ms", with = "millis")]
    pub batch_timeout: Duration,

    /// Deadline for probing a single known address
    #[serde(rename = "probe_timeout_ms", with = "millis")]
    pub probe_timeout: Duration,

    /// Upper bound on local subnet detection
    #[serde(rename = "subnet_timeout_ms", with = "millis")]
    pub subnet_timeout: Duration,

    /// Minimum gap between the end of one command and the start of the next
    #[serde(rename = "command_interval_ms", with = "millis")]
    pub command_interval: Duration,

    /// Deadline for sending one command
    #[serde(rename = "command_timeout_ms", with = "millis")]
    pub command_timeout: Duration,

    /// Subnets scanned after the detected one, in order
    pub fallback_prefixes: Vec<SubnetPrefix>,

    /// Device path that starts the pairing handshake
    pub pairing_path: String,

    /// Pass-through relay base URL; requests go direct when unset
    pub relay_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            control_port: CONTROL_PORT,
            batch_size: 25,
            batch_timeout: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(2),
            subnet_timeout: Duration::from_secs(1),
            command_interval: Duration::from_millis(100),
            command_timeout: Duration::from_secs(2),
            fallback_prefixes: DEFAULT_FALLBACK_PREFIXES.to_vec(),
            pairing_path: "pair".to_string(),
            relay_url: None,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.batch_timeout.is_zero() || self.probe_timeout.is_zero() {
            return Err(ConfigError::Invalid("probe timeouts must be positive".into()));
        }
        if self.command_timeout.is_zero() {
            return Err(ConfigError::Invalid("command_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
