use crate::addresses::parse_address;
use crate::subscription::{EngineEvent, EventSender};
use crate::store::{KeyValueStore, StoreError};
use crate::types::{DeviceCapabilities, DeviceRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Store key holding the last known address, as a dotted quad
pub const ADDRESS_KEY: &str = "device.address";

/// Store key holding the last known capabilities, as JSON
pub const CAPABILITIES_KEY: &str = "device.capabilities";

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCapabilities {
    #[serde(flatten)]
    capabilities: DeviceCapabilities,
    #[serde(default)]
    last_verified_at: Option<DateTime<Utc>>,
}

/// Owner of the single current [`DeviceRecord`]
///
/// Records are replaced whole behind a lock, so readers never see a partial
/// update. Every change is mirrored to the durable store; store failures are
/// logged and the in-memory record stays authoritative.
pub struct DeviceRegistry {
    store: Arc<dyn KeyValueStore>,
    current: RwLock<Option<Arc<DeviceRecord>>>,
    /// Held across a swap and its store write, so the store sees changes in
    /// the same order as `current`
    persist: Mutex<()>,
    events: EventSender,
}

impl DeviceRegistry {
    /// Open the registry, restoring the last known device from `store`
    pub(crate) fn open(store: Arc<dyn KeyValueStore>, events: EventSender) -> Self {
        let current = match load_record(store.as_ref()) {
            Ok(Some(record)) => {
                tracing::info!("Restored last known device {}", record.address);
                Some(Arc::new(record))
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Discarding unreadable stored device: {}", e);
                clear_store(store.as_ref());
                None
            }
        };

        Self {
            store,
            current: RwLock::new(current),
            persist: Mutex::new(()),
            events,
        }
    }

    fn lock_persist(&self) -> MutexGuard<'_, ()> {
        self.persist.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current device
    pub fn current(&self) -> Option<Arc<DeviceRecord>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the current device and persist it
    pub fn replace(&self, record: DeviceRecord) -> Arc<DeviceRecord> {
        let record = Arc::new(record);
        let _persist = self.lock_persist();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());

        if let Err(e) = save_record(self.store.as_ref(), &record) {
            tracing::warn!("Failed to persist device {}: {}", record.address, e);
        }
        self.events.emit(EngineEvent::DeviceFound(record.clone()));
        record
    }

    /// Drop the current device, but only if it is still the one at `address`.
    ///
    /// Returns whether a record was cleared. A newer record written by a
    /// concurrent discovery is left alone.
    pub fn invalidate(&self, address: Ipv4Addr) -> bool {
        let _persist = self.lock_persist();
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            match current.as_ref() {
                Some(record) if record.address == address => *current = None,
                _ => return false,
            }
        }

        tracing::info!("Invalidated device {}", address);
        clear_store(self.store.as_ref());
        self.events.emit(EngineEvent::DeviceInvalidated(address));
        true
    }

    /// Drop whatever device is current and clear both stored entries
    pub fn forget(&self) {
        let _persist = self.lock_persist();
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        clear_store(self.store.as_ref());
        if let Some(record) = previous {
            tracing::info!("Forgot device {}", record.address);
            self.events.emit(EngineEvent::DeviceInvalidated(record.address));
        }
    }
}

fn load_record(store: &dyn KeyValueStore) -> Result<Option<DeviceRecord>, StoreError> {
    let Some(address_text) = store.get(ADDRESS_KEY)? else {
        return Ok(None);
    };
    let Ok(address) = parse_address(&address_text) else {
        tracing::warn!("Stored device address {:?} is not valid", address_text);
        clear_store(store);
        return Ok(None);
    };

    let stored: Option<StoredCapabilities> = match store.get(CAPABILITIES_KEY)? {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    };
    let (capabilities, last_verified_at) = stored
        .map(|s| (s.capabilities, s.last_verified_at))
        .unwrap_or_default();

    Ok(Some(DeviceRecord {
        address,
        capabilities,
        last_verified_at,
    }))
}

fn save_record(store: &dyn KeyValueStore, record: &DeviceRecord) -> Result<(), StoreError> {
    let stored = StoredCapabilities {
        capabilities: record.capabilities.clone(),
        last_verified_at: record.last_verified_at,
    };
    store.set(ADDRESS_KEY, &record.address.to_string())?;
    store.set(CAPABILITIES_KEY, &serde_json::to_string(&stored)?)?;
    Ok(())
}

fn clear_store(store: &dyn KeyValueStore) {
    for key in [ADDRESS_KEY, CAPABILITIES_KEY] {
        if let Err(e) = store.remove(key) {
            tracing::warn!("Failed to clear stored {}: {}", key, e);
        }
    }
}
