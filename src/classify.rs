//! Maps raw transport outcomes onto [`ErrorCause`] and [`RokuError`].

use crate::error::{ErrorCause, RokuError};
use crate::protocol::Reply;
use crate::transport::TransportError;
use std::net::Ipv4Addr;

/// Cause of a transport failure
pub fn classify_transport(error: &TransportError) -> ErrorCause {
    match error {
        TransportError::Timeout | TransportError::Connect(_) | TransportError::Request(_) => {
            ErrorCause::Unreachable
        }
        TransportError::Body(_) => ErrorCause::ProtocolViolation,
    }
}

/// Cause implied by an HTTP status, or `None` when the request was accepted
pub fn classify_status(status: u16) -> Option<ErrorCause> {
    match status {
        200..=399 => None,
        401 | 403 => Some(ErrorCause::AuthorizationRequired),
        // Relays report an unreachable device as 502/504
        500..=599 => Some(ErrorCause::Unreachable),
        _ => Some(ErrorCause::ProtocolViolation),
    }
}

/// Turn a transport outcome into the reply or a classified error
pub fn classify(
    address: Ipv4Addr,
    outcome: Result<Reply, TransportError>,
) -> Result<Reply, RokuError> {
    let reply = match outcome {
        Ok(reply) => reply,
        Err(e) => {
            return Err(match classify_transport(&e) {
                ErrorCause::ProtocolViolation => RokuError::ProtocolViolation {
                    address,
                    detail: e.to_string(),
                },
                _ => RokuError::Unreachable {
                    address,
                    reason: e.to_string(),
                },
            })
        }
    };

    match classify_status(reply.status) {
        None => Ok(reply),
        Some(ErrorCause::AuthorizationRequired) => Err(RokuError::AuthorizationRequired {
            address,
            command: None,
            pairing_requested: false,
        }),
        Some(ErrorCause::Unreachable) => Err(RokuError::Unreachable {
            address,
            reason: format!("HTTP {}", reply.status),
        }),
        Some(_) => Err(RokuError::ProtocolViolation {
            address,
            detail: format!("HTTP {}: {}", reply.status, snippet(&reply.body)),
        }),
    }
}

/// First 100 characters of a body, for error details
pub(crate) fn snippet(body: &str) -> String {
    const LIMIT: usize = 100;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
