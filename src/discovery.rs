use crate::addresses::{AddressSpace, SubnetPrefix};
use crate::error::{Result, RokuError};
use crate::prober::Prober;
use crate::registry::DeviceRegistry;
use crate::subnet::SubnetDetector;
use crate::subscription::{EngineEvent, EventSender};
use crate::types::{DeviceRecord, ProbeResult};
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Where a discovery run currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryState {
    Idle,
    /// Re-probing the last known address
    TryingCached(Ipv4Addr),
    /// Probing candidates of one subnet
    Scanning { prefix: SubnetPrefix },
    Found(Ipv4Addr),
    /// Nothing answered; manual entry is needed
    Exhausted,
    Cancelled,
}

/// Tunables for the batched scan
#[derive(Debug, Clone)]
pub(crate) struct ScanSettings {
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub probe_timeout: Duration,
    pub fallback_prefixes: Vec<SubnetPrefix>,
}

/// Finds the device on the local network
///
/// A run first re-probes the cached address, then scans the detected subnet
/// and the fallback subnets in concurrent batches. The first device to answer
/// wins and stops the scan.
pub struct Discovery {
    prober: Prober,
    registry: Arc<DeviceRegistry>,
    detector: Arc<dyn SubnetDetector>,
    settings: ScanSettings,
    events: EventSender,
    state: Mutex<DiscoveryState>,
    /// Serializes runs and manual connects; a queued discovery then hits the
    /// fresh cache
    run_lock: tokio::sync::Mutex<()>,
}

impl Discovery {
    pub(crate) fn new(
        prober: Prober,
        registry: Arc<DeviceRegistry>,
        detector: Arc<dyn SubnetDetector>,
        settings: ScanSettings,
        events: EventSender,
    ) -> Self {
        Self {
            prober,
            registry,
            detector,
            settings,
            events,
            state: Mutex::new(DiscoveryState::Idle),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Current state of the most recent run
    pub fn state(&self) -> DiscoveryState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_state(&self, state: DiscoveryState) {
        tracing::debug!("Discovery state: {:?}", state);
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state.clone();
        self.events.emit(EngineEvent::DiscoveryStateChanged(state));
    }

    /// Locate the device, or fail with `Exhausted` / `Cancelled`
    pub async fn discover(&self, cancel: &CancellationToken) -> Result<Arc<DeviceRecord>> {
        let _run = tokio::select! {
            guard = self.run_lock.lock() => guard,
            () = cancel.cancelled() => return Err(RokuError::Cancelled),
        };

        let result = self.run(cancel).await;
        match &result {
            Ok(record) => self.set_state(DiscoveryState::Found(record.address)),
            Err(RokuError::Cancelled) => {
                tracing::info!("Discovery cancelled");
                self.set_state(DiscoveryState::Cancelled);
            }
            Err(e) => {
                tracing::warn!("Discovery failed: {}", e);
                self.set_state(DiscoveryState::Exhausted);
            }
        }
        result
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<Arc<DeviceRecord>> {
        if let Some(cached) = self.registry.current() {
            let address = cached.address;
            tracing::info!("Trying stored device address {}", address);
            self.set_state(DiscoveryState::TryingCached(address));

            let deadline = tokio::time::Instant::now() + self.settings.probe_timeout;
            let result = tokio::select! {
                result = self.prober.probe(address, deadline) => result,
                () = cancel.cancelled() => return Err(RokuError::Cancelled),
            };

            match result.outcome {
                Ok(capabilities) => {
                    tracing::info!("Stored device {} still answers", address);
                    return Ok(self.registry.replace(DeviceRecord::verified(address, capabilities)));
                }
                Err(e) => {
                    tracing::info!("Stored device {} did not answer ({}), scanning", address, e.cause());
                    self.registry.invalidate(address);
                }
            }
        }

        let detected = tokio::select! {
            detected = self.detector.detect() => detected,
            () = cancel.cancelled() => return Err(RokuError::Cancelled),
        };
        let space = AddressSpace::new(detected, &self.settings.fallback_prefixes);
        tracing::info!(
            "Scanning {} subnet(s): {}",
            space.prefixes().len(),
            space
                .prefixes()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        self.scan(&space, cancel).await
    }

    async fn scan(&self, space: &AddressSpace, cancel: &CancellationToken) -> Result<Arc<DeviceRecord>> {
        let batch_size = self.settings.batch_size.max(1);
        let mut candidates = space.candidates();
        let mut current_prefix = None;
        let mut probed = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(RokuError::Cancelled);
            }

            let batch: Vec<_> = candidates.by_ref().take(batch_size).collect();
            let Some(first) = batch.first() else {
                tracing::warn!("No device answered after probing {} address(es)", probed);
                return Err(RokuError::Exhausted { probed });
            };
            if current_prefix != Some(first.prefix) {
                current_prefix = Some(first.prefix);
                self.set_state(DiscoveryState::Scanning { prefix: first.prefix });
            }

            let deadline = tokio::time::Instant::now() + self.settings.batch_timeout;
            tracing::debug!(
                "Probing batch {}..{}",
                first.address,
                batch.last().map_or(first.address, |c| c.address)
            );
            probed += batch.len();

            let mut in_flight: FuturesUnordered<_> = batch
                .iter()
                .map(|candidate| self.prober.probe(candidate.address, deadline))
                .collect();

            // Dropping `in_flight` on return aborts every probe still running
            while let Some(result) = tokio::select! {
                next = in_flight.next() => next,
                () = cancel.cancelled() => return Err(RokuError::Cancelled),
            } {
                if let Some(record) = self.accept(result) {
                    return Ok(record);
                }
            }
        }
    }

    fn accept(&self, result: ProbeResult) -> Option<Arc<DeviceRecord>> {
        let ProbeResult { address, outcome } = result;
        let capabilities = outcome.ok()?;
        tracing::info!("Discovered device at {}", address);
        Some(self.registry.replace(DeviceRecord::verified(address, capabilities)))
    }

    /// Check a manually entered address and make it current if it answers.
    ///
    /// Waits for a running discovery to finish first, so a scan never
    /// overrides the manual choice. A failed check leaves the existing record
    /// untouched.
    pub async fn connect(&self, address: Ipv4Addr) -> Result<Arc<DeviceRecord>> {
        let _run = self.run_lock.lock().await;
        tracing::info!("Testing connection to {}", address);
        let deadline = tokio::time::Instant::now() + self.settings.probe_timeout;
        let result = self.prober.probe(address, deadline).await;
        let capabilities = result.outcome?;
        let record = self.registry.replace(DeviceRecord::verified(address, capabilities));
        self.set_state(DiscoveryState::Found(address));
        Ok(record)
    }
}
