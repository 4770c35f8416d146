use crate::addresses::parse_address;
use crate::config::EngineConfig;
use crate::discovery::{Discovery, DiscoveryState, ScanSettings};
use crate::dispatcher::{CommandDispatcher, CommandTicket};
use crate::error::Result;
use crate::pairing::{EcpPairing, PairingHandler};
use crate::prober::Prober;
use crate::registry::DeviceRegistry;
use crate::store::{KeyValueStore, MemoryStore};
use crate::subnet::{RouteProbeDetector, SubnetDetector};
use crate::subscription::{EventReceiver, EventSender};
use crate::transport::{HttpTransport, RelayTransport, Transport};
use crate::types::DeviceRecord;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Client for discovering and controlling a Roku device
///
/// One instance owns the current device record, the discovery orchestrator
/// and the command queue. Construct it once per session with
/// [`RokuClient::builder`].
pub struct RokuClient {
    registry: Arc<DeviceRegistry>,
    discovery: Discovery,
    dispatcher: CommandDispatcher,
    events: EventSender,
}

impl RokuClient {
    /// Start configuring a client
    pub fn builder() -> RokuClientBuilder {
        RokuClientBuilder::default()
    }

    /// Locate the device, trying the stored address first
    ///
    /// # Example
    ///
    /// ```no_run
    /// use roku_remote::{ErrorCause, RokuClient};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = RokuClient::builder().build();
    ///     match client.discover().await {
    ///         Ok(device) => println!("Found {}", device.label()),
    ///         Err(e) if e.cause() == ErrorCause::Exhausted => {
    ///             client.connect("192.168.1.100").await?;
    ///         }
    ///         Err(e) => return Err(e.into()),
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub async fn discover(&self) -> Result<Arc<DeviceRecord>> {
        self.discovery.discover(&CancellationToken::new()).await
    }

    /// Like [`RokuClient::discover`], aborting with `Cancelled` when `cancel` fires
    pub async fn discover_with_cancel(&self, cancel: CancellationToken) -> Result<Arc<DeviceRecord>> {
        self.discovery.discover(&cancel).await
    }

    /// Use a manually entered address, e.g. after discovery was exhausted
    pub async fn connect(&self, address: &str) -> Result<Arc<DeviceRecord>> {
        let address = parse_address(address.trim())?;
        self.discovery.connect(address).await
    }

    /// Queue a command for the current device and return immediately
    ///
    /// Outside a Tokio runtime the ticket fails with `NoRuntime`. Await
    /// [`CommandTicket::outcome`] to learn whether it was delivered.
    pub fn enqueue(&self, command: impl Into<String>) -> CommandTicket {
        self.dispatcher.enqueue(command)
    }

    /// Queue a command and wait for it to be delivered
    ///
    /// # Example
    ///
    /// ```no_run
    /// use roku_remote::RokuClient;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = RokuClient::builder().build();
    ///     client.discover().await?;
    ///     client.send("volume_up").await?;
    ///     client.send("netflix").await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn send(&self, command: impl Into<String>) -> Result<()> {
        self.dispatcher.send(command).await
    }

    /// Drop queued commands that have not started yet
    pub fn cancel_pending(&self) -> usize {
        self.dispatcher.cancel_pending()
    }

    /// Commands waiting behind the one being sent
    pub fn pending_commands(&self) -> usize {
        self.dispatcher.pending()
    }

    /// The device commands currently go to
    pub fn current_device(&self) -> Option<Arc<DeviceRecord>> {
        self.registry.current()
    }

    /// Forget the current device, its stored entries, and any queued commands
    pub fn forget(&self) {
        self.registry.forget();
        let dropped = self.dispatcher.cancel_pending();
        if dropped > 0 {
            tracing::info!("Cancelled {} queued command(s)", dropped);
        }
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    /// Subscribe to engine events
    ///
    /// Multiple subscriptions can be active simultaneously.
    pub fn subscribe_events(&self) -> EventReceiver {
        self.events.subscribe()
    }
}

/// Builder for [`RokuClient`]
///
/// Anything not supplied falls back to: an in-memory store, the direct HTTP
/// transport (or the relay when `relay_url` is configured), route-based subnet
/// detection, and pairing over the control port.
#[derive(Default)]
pub struct RokuClientBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    transport: Option<Arc<dyn Transport>>,
    detector: Option<Arc<dyn SubnetDetector>>,
    pairing: Option<Arc<dyn PairingHandler>>,
}

impl RokuClientBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Durable store for the last known device
    pub fn store(mut self, store: impl KeyValueStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn subnet_detector(mut self, detector: impl SubnetDetector + 'static) -> Self {
        self.detector = Some(Arc::new(detector));
        self
    }

    pub fn pairing(mut self, pairing: impl PairingHandler + 'static) -> Self {
        self.pairing = Some(Arc::new(pairing));
        self
    }

    pub fn build(self) -> RokuClient {
        let config = self.config;
        let events = EventSender::new();

        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(&config),
        };
        let store: Arc<dyn KeyValueStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };
        let detector: Arc<dyn SubnetDetector> = match self.detector {
            Some(detector) => detector,
            None => Arc::new(RouteProbeDetector::new(config.subnet_timeout)),
        };
        let pairing: Arc<dyn PairingHandler> = match self.pairing {
            Some(pairing) => pairing,
            None => Arc::new(EcpPairing::new(
                transport.clone(),
                config.pairing_path.clone(),
                config.command_timeout,
            )),
        };

        let registry = Arc::new(DeviceRegistry::open(store, events.clone()));
        let discovery = Discovery::new(
            Prober::new(transport.clone()),
            registry.clone(),
            detector,
            ScanSettings {
                batch_size: config.batch_size,
                batch_timeout: config.batch_timeout,
                probe_timeout: config.probe_timeout,
                fallback_prefixes: config.fallback_prefixes.clone(),
            },
            events.clone(),
        );
        let dispatcher = CommandDispatcher::new(
            transport,
            registry.clone(),
            pairing,
            events.clone(),
            config.command_interval,
            config.command_timeout,
        );

        RokuClient {
            registry,
            discovery,
            dispatcher,
            events,
        }
    }
}

fn default_transport(config: &EngineConfig) -> Arc<dyn Transport> {
    match &config.relay_url {
        Some(url) => {
            tracing::info!("Routing device requests through relay {}", url);
            Arc::new(RelayTransport::new(url.clone()))
        }
        None => Arc::new(HttpTransport::new().with_port(config.control_port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RokuError;

    #[tokio::test]
    async fn test_connect_rejects_malformed_address() {
        let client = RokuClient::builder().build();
        for text in ["", "10.0.0", "10.0.0.256", "roku.local"] {
            assert!(matches!(
                client.connect(text).await,
                Err(RokuError::InvalidAddress(_))
            ));
        }
        assert!(client.current_device().is_none());
    }

    #[test]
    fn test_builds_with_relay_config() {
        let config = EngineConfig {
            relay_url: Some("https://relay.example.com/roku/".into()),
            ..EngineConfig::default()
        };
        let client = RokuClient::builder().config(config).build();
        assert_eq!(client.discovery_state(), DiscoveryState::Idle);
    }

    #[test]
    fn test_enqueue_without_runtime_fails_ticket() {
        use futures_util::FutureExt;

        let client = RokuClient::builder().build();
        let ticket = client.enqueue("up");
        assert_eq!(ticket.command(), "up");
        assert_eq!(ticket.outcome().now_or_never(), Some(Err(RokuError::NoRuntime)));
        assert_eq!(client.pending_commands(), 0);

        // Still usable once a runtime exists
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let err = runtime.block_on(client.send("up")).unwrap_err();
        assert_eq!(err, RokuError::NoDevice);
    }
}
