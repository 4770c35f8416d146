use crate::classify::classify;
use crate::error::Result;
use crate::protocol::{EcpRequest, Method};
use crate::transport::Transport;
use crate::types::DeviceRecord;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Starts the device's pairing handshake
///
/// Called at most once per denied command. A successful return means the
/// device is now asking the user to authorize this client; the command itself
/// is not retried.
#[async_trait]
pub trait PairingHandler: Send + Sync {
    async fn request_pairing(&self, device: &DeviceRecord) -> Result<()>;
}

/// Asks the device to show its authorization prompt over the control port
pub struct EcpPairing {
    transport: Arc<dyn Transport>,
    path: String,
    timeout: Duration,
}

impl EcpPairing {
    pub fn new(transport: Arc<dyn Transport>, path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport,
            path: path.into(),
            timeout,
        }
    }
}

#[async_trait]
impl PairingHandler for EcpPairing {
    async fn request_pairing(&self, device: &DeviceRecord) -> Result<()> {
        tracing::info!("Requesting pairing with {}", device.address);
        let request = EcpRequest::new(device.address, Method::Post, self.path.clone(), self.timeout);
        classify(device.address, self.transport.execute(request).await)?;
        Ok(())
    }
}
