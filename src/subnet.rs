//! Best-effort detection of the local /24 to scan first.

use crate::addresses::SubnetPrefix;
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::net::UdpSocket;

/// Any routable address works; connecting a UDP socket sends nothing
const ROUTE_TARGET: (Ipv4Addr, u16) = (Ipv4Addr::new(8, 8, 8, 8), 80);

/// Finds the client's own subnet so it can be scanned before the fallbacks
///
/// Detection only affects scan order, so implementations return `None` instead
/// of failing.
#[async_trait]
pub trait SubnetDetector: Send + Sync {
    async fn detect(&self) -> Option<SubnetPrefix>;
}

/// Asks the kernel which local address it would route outbound traffic from
#[derive(Debug, Clone)]
pub struct RouteProbeDetector {
    timeout: Duration,
}

impl RouteProbeDetector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn local_address() -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.connect(ROUTE_TARGET).await?;
        Ok(socket.local_addr()?.ip())
    }
}

impl Default for RouteProbeDetector {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl SubnetDetector for RouteProbeDetector {
    async fn detect(&self) -> Option<SubnetPrefix> {
        match tokio::time::timeout(self.timeout, Self::local_address()).await {
            Ok(Ok(IpAddr::V4(ip))) => {
                let prefix = prefix_for(ip);
                match prefix {
                    Some(p) => tracing::info!("Detected local subnet {} (from {})", p, ip),
                    None => tracing::debug!("Local address {} is not a private LAN address", ip),
                }
                prefix
            }
            Ok(Ok(IpAddr::V6(ip))) => {
                tracing::debug!("Local address {} is IPv6, no subnet hint", ip);
                None
            }
            Ok(Err(e)) => {
                tracing::warn!("Subnet detection failed: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!("Subnet detection timed out after {:?}", self.timeout);
                None
            }
        }
    }
}

/// Always reports the same answer
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSubnet(pub Option<SubnetPrefix>);

#[async_trait]
impl SubnetDetector for FixedSubnet {
    async fn detect(&self) -> Option<SubnetPrefix> {
        self.0
    }
}

/// Only private, non-loopback addresses say anything about the LAN
fn prefix_for(ip: Ipv4Addr) -> Option<SubnetPrefix> {
    if ip.is_private() && !ip.is_loopback() && !ip.is_unspecified() {
        Some(SubnetPrefix::of(ip))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_addresses_give_prefix() {
        assert_eq!(
            prefix_for(Ipv4Addr::new(192, 168, 1, 42)),
            Some(SubnetPrefix([192, 168, 1]))
        );
        assert_eq!(prefix_for(Ipv4Addr::new(10, 0, 0, 7)), Some(SubnetPrefix([10, 0, 0])));
        assert_eq!(prefix_for(Ipv4Addr::new(172, 20, 3, 9)), Some(SubnetPrefix([172, 20, 3])));
    }

    #[test]
    fn test_public_and_loopback_ignored() {
        assert_eq!(prefix_for(Ipv4Addr::new(127, 0, 0, 1)), None);
        assert_eq!(prefix_for(Ipv4Addr::new(8, 8, 4, 4)), None);
        assert_eq!(prefix_for(Ipv4Addr::UNSPECIFIED), None);
    }

    #[tokio::test]
    async fn test_fixed_subnet() {
        let prefix = SubnetPrefix([192, 168, 1]);
        assert_eq!(FixedSubnet(Some(prefix)).detect().await, Some(prefix));
        assert_eq!(FixedSubnet(None).detect().await, None);
    }

    #[tokio::test]
    async fn test_route_detection_never_hangs() {
        // Result depends on the host network; it must simply return
        let detector = RouteProbeDetector::new(Duration::from_millis(500));
        let _ = detector.detect().await;
    }
}
