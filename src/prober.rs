use crate::classify::{classify, snippet};
use crate::error::RokuError;
use crate::protocol::{parse_device_info, EcpRequest};
use crate::transport::Transport;
use crate::types::ProbeResult;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};

/// Issues bounded-time status queries and classifies the answers
///
/// Cheap to clone and safe to call concurrently for many addresses.
#[derive(Clone)]
pub struct Prober {
    transport: Arc<dyn Transport>,
}

impl Prober {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Query `address` for its self-description, giving up at `deadline`.
    ///
    /// Never fails: every problem is folded into the returned [`ProbeResult`].
    pub async fn probe(&self, address: Ipv4Addr, deadline: Instant) -> ProbeResult {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return unreachable(address, "probe deadline already passed");
        }

        let request = EcpRequest::device_info(address, remaining);
        let outcome = match timeout_at(deadline, self.transport.execute(request)).await {
            Ok(outcome) => outcome,
            Err(_) => return unreachable(address, "request timed out"),
        };

        let outcome = classify(address, outcome).and_then(|reply| {
            parse_device_info(&reply.body).ok_or_else(|| RokuError::ProtocolViolation {
                address,
                detail: format!("not a device-info document: {}", snippet(&reply.body)),
            })
        });

        match &outcome {
            Ok(caps) => tracing::info!(
                "Roku found at {} ({})",
                address,
                caps.model_name.as_deref().unwrap_or("unknown model")
            ),
            Err(e) => tracing::debug!("Probe of {} failed: {}", address, e.cause()),
        }

        ProbeResult { address, outcome }
    }
}

fn unreachable(address: Ipv4Addr, reason: &str) -> ProbeResult {
    tracing::debug!("Probe of {} failed: {}", address, reason);
    ProbeResult {
        address,
        outcome: Err(RokuError::Unreachable {
            address,
            reason: reason.to_string(),
        }),
    }
}
