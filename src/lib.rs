//! Rust library for finding and remote-controlling a Roku device on the LAN
//!
//! This library provides an async engine that locates a Roku device over its
//! HTTP control port and delivers remote-control commands to it. It supports:
//!
//! - Re-verification of the last known device before any scan
//! - Concurrent, batched scanning of the local subnet and fallback subnets
//! - Manual address entry when scanning finds nothing
//! - An ordered, rate-limited command queue
//! - One-shot pairing on devices that require on-screen authorization
//! - Direct or relayed HTTP transport
//! - Real-time engine event subscriptions
//!
//! # Quick Start
//!
//! ```no_run
//! use roku_remote::{FileStore, RokuClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = FileStore::new(FileStore::default_path().ok_or("no config dir")?);
//!     let client = RokuClient::builder().store(store).build();
//!
//!     // Find the device (the stored address is tried first)
//!     let device = client.discover().await?;
//!     println!("Found {}", device.label());
//!
//!     // Commands are delivered in order, at most one at a time
//!     client.send("home").await?;
//!     client.send("down").await?;
//!     client.send("select").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Manual Connection
//!
//! If discovery is exhausted, connect to a known address directly:
//!
//! ```no_run
//! use roku_remote::RokuClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RokuClient::builder().build();
//!     client.connect("192.168.1.100").await?;
//!     client.send("play").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Client**: Builder and facade wiring everything together
//! - **Discovery**: Cached re-probe, subnet detection, batched scan
//! - **Dispatcher**: Serialized, rate-limited command queue with pairing
//! - **Registry**: The single current device and its durable copy
//! - **Prober / Classifier**: Status queries and failure classification
//! - **Transport**: Direct and relayed HTTP delivery
//! - **Protocol**: Control-port paths and the device-info document

mod addresses;
mod classify;
mod client;
mod commands;
mod config;
mod discovery;
mod dispatcher;
mod error;
mod pairing;
mod prober;
mod protocol;
mod registry;
mod store;
mod subnet;
mod subscription;
mod transport;
mod types;

// Public exports
pub use addresses::{
    is_valid_address, parse_address, AddressSpace, CandidateAddress, SubnetPrefix,
    DEFAULT_FALLBACK_PREFIXES,
};
pub use client::{RokuClient, RokuClientBuilder};
pub use commands::translate;
pub use config::{ConfigError, EngineConfig};
pub use discovery::DiscoveryState;
pub use dispatcher::CommandTicket;
pub use error::{ErrorCause, Result, RokuError};
pub use pairing::{EcpPairing, PairingHandler};
pub use prober::Prober;
pub use protocol::{
    is_device_info, parse_device_info, CommandToken, EcpRequest, Method, Reply, CONTROL_PORT,
    DEVICE_INFO_PATH,
};
pub use registry::{ADDRESS_KEY, CAPABILITIES_KEY};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use subnet::{FixedSubnet, RouteProbeDetector, SubnetDetector};
pub use subscription::{EngineEvent, EventReceiver};
pub use transport::{HttpTransport, RelayTransport, Transport, TransportError};
pub use types::{DeviceCapabilities, DeviceRecord, ProbeResult};
