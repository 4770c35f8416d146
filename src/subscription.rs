use crate::discovery::DiscoveryState;
use crate::error::ErrorCause;
use crate::types::DeviceRecord;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 100;

/// Something the presentation layer may want to show
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Discovery moved to a new state
    DiscoveryStateChanged(DiscoveryState),

    /// A device was found or re-verified
    DeviceFound(Arc<DeviceRecord>),

    /// The current device was dropped (unreachable or forgotten)
    DeviceInvalidated(Ipv4Addr),

    /// A pairing handshake was started; the user should accept it on screen
    PairingRequested(Ipv4Addr),

    /// A command reached the device
    CommandSent { command: String },

    /// A command failed
    CommandFailed { command: String, cause: ErrorCause },
}

/// Sending half shared by the engine's components
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventSender {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Having nobody listening is normal
    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub(crate) fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.tx.subscribe())
    }
}

/// Receiver for engine events
pub struct EventReceiver {
    rx: broadcast::Receiver<EngineEvent>,
}

impl EventReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<EngineEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event
    ///
    /// Returns `None` once the engine has been dropped. A receiver that falls
    /// behind skips the missed events.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event receiver lagged by {} events", n);
                }
            }
        }
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("Event receiver lagged by {} events", n);
                }
                Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => {
                    return None
                }
            }
        }
    }
}
