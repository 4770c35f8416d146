#![allow(dead_code)]

use async_trait::async_trait;
use roku_remote::{
    DeviceRecord, EcpRequest, EngineConfig, FixedSubnet, KeyValueStore, MemoryStore, Method,
    PairingHandler, Reply, RokuClient, SubnetPrefix, Transport, TransportError, ADDRESS_KEY,
    CAPABILITIES_KEY,
};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// What the fake device network does with one request
pub struct Scripted {
    pub delay: Duration,
    pub result: Result<Reply, TransportError>,
}

impl Scripted {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(Reply::new(status, body)),
        }
    }

    pub fn refused() -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(TransportError::Connect("connection refused".into())),
        }
    }

    /// Never answers within any sane deadline
    pub fn silent() -> Self {
        Self {
            delay: Duration::from_secs(3600),
            result: Err(TransportError::Timeout),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub address: Ipv4Addr,
    pub method: Method,
    pub path: String,
    pub at: Instant,
}

type Handler = dyn Fn(&EcpRequest) -> Scripted + Send + Sync;

/// Transport that answers from a script and records every request
#[derive(Clone)]
pub struct FakeTransport {
    handler: Arc<Handler>,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeTransport {
    pub fn new(handler: impl Fn(&EcpRequest) -> Scripted + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A network where only `device` answers, and accepts every command
    pub fn single_device(device: Ipv4Addr, requires_pairing: bool) -> Self {
        Self::new(move |request| {
            if request.address != device {
                return Scripted::silent();
            }
            match request.method {
                Method::Get => Scripted::ok(device_info_xml("Roku Ultra", requires_pairing)),
                Method::Post => Scripted::ok(""),
            }
        })
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    pub fn count_to(&self, address: Ipv4Addr) -> usize {
        self.requests().iter().filter(|r| r.address == address).count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, request: EcpRequest) -> Result<Reply, TransportError> {
        self.log.lock().unwrap().push(Recorded {
            address: request.address,
            method: request.method,
            path: request.path.clone(),
            at: Instant::now(),
        });

        let scripted = (self.handler)(&request);
        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }
        scripted.result
    }
}

/// Counts pairing requests and always succeeds
#[derive(Clone, Default)]
pub struct CountingPairing {
    calls: Arc<AtomicUsize>,
}

impl CountingPairing {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PairingHandler for CountingPairing {
    async fn request_pairing(&self, _device: &DeviceRecord) -> roku_remote::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn device_info_xml(model: &str, requires_pairing: bool) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n\
         <device-info>\n\
         \t<model-name>{model}</model-name>\n\
         \t<model-number>4800X</model-number>\n\
         \t<is-tv>false</is-tv>\n\
         \t<user-device-name>Living Room</user-device-name>\n\
         \t<requires-pairing>{requires_pairing}</requires-pairing>\n\
         </device-info>\n"
    )
}

/// Store that already remembers `address`
pub fn store_with_device(address: Ipv4Addr, requires_pairing: bool) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.set(ADDRESS_KEY, &address.to_string()).unwrap();
    store
        .set(
            CAPABILITIES_KEY,
            &format!(r#"{{"modelName":"Roku Ultra","requiresPairing":{requires_pairing}}}"#),
        )
        .unwrap();
    store
}

/// Shares one store between a client and the test
pub struct SharedStore(pub Arc<MemoryStore>);

impl KeyValueStore for SharedStore {
    fn get(&self, key: &str) -> Result<Option<String>, roku_remote::StoreError> {
        self.0.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), roku_remote::StoreError> {
        self.0.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), roku_remote::StoreError> {
        self.0.remove(key)
    }
}

pub fn config(fallback: &[[u8; 3]]) -> EngineConfig {
    EngineConfig {
        fallback_prefixes: fallback.iter().copied().map(SubnetPrefix).collect(),
        ..EngineConfig::default()
    }
}

pub fn client(
    transport: &FakeTransport,
    store: &Arc<MemoryStore>,
    detected: Option<[u8; 3]>,
    config: EngineConfig,
) -> RokuClient {
    RokuClient::builder()
        .config(config)
        .transport(transport.clone())
        .store(SharedStore(store.clone()))
        .subnet_detector(FixedSubnet(detected.map(SubnetPrefix)))
        .build()
}
