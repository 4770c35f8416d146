use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Result type for Roku engine operations
pub type Result<T> = std::result::Result<T, RokuError>;

/// Closed set of user-facing failure causes
///
/// Every [`RokuError`] maps onto exactly one of these, so a presentation layer
/// can decide how to react without matching on transport details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCause {
    /// No response, connection refused, or timeout
    Unreachable,
    /// The device explicitly denied the request
    AuthorizationRequired,
    /// Malformed or unexpected response
    ProtocolViolation,
    /// Unknown command name
    Unsupported,
    /// Caller-initiated abort
    Cancelled,
    /// Discovery probed every candidate without a match
    Exhausted,
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCause::Unreachable => "unreachable",
            ErrorCause::AuthorizationRequired => "authorization required",
            ErrorCause::ProtocolViolation => "protocol violation",
            ErrorCause::Unsupported => "unsupported",
            ErrorCause::Cancelled => "cancelled",
            ErrorCause::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

/// Errors that can occur when discovering or controlling a Roku device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RokuError {
    /// The device did not answer
    #[error(
        "Could not connect to Roku device at {address} ({reason}). Check that the address is \
         correct, the device is turned on, and you are on the same network"
    )]
    Unreachable {
        /// Address that was attempted
        address: Ipv4Addr,
        /// Low-level reason, for diagnostics
        reason: String,
    },

    /// The device refused the request until the user authorizes this client
    #[error("Roku device at {address} denied {}{}", denied_what(.command), pairing_hint(.pairing_requested))]
    AuthorizationRequired {
        /// Address that was attempted
        address: Ipv4Addr,
        /// Command that was denied, if any
        command: Option<String>,
        /// Whether a pairing handshake was started for this failure
        pairing_requested: bool,
    },

    /// The device answered with something we cannot use
    #[error("Unexpected response from {address}: {detail}")]
    ProtocolViolation {
        /// Address that was attempted
        address: Ipv4Addr,
        /// What was wrong with the response
        detail: String,
    },

    /// Command name has no protocol mapping
    #[error("Unsupported command: {command}")]
    Unsupported {
        /// The rejected command name
        command: String,
    },

    /// The caller aborted the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Discovery found nothing; fall back to manual address entry
    #[error("No Roku device found after probing {probed} address(es); enter the address manually")]
    Exhausted {
        /// Number of candidate addresses probed
        probed: usize,
    },

    /// Commands were queued with no Tokio runtime to deliver them
    #[error("No async runtime available to deliver commands")]
    NoRuntime,

    /// A command was issued before any device was known
    #[error("No Roku device selected; run discovery or connect to an address first")]
    NoDevice,

    /// Manually entered text is not a dotted-quad IPv4 address
    #[error("Invalid IP address format: {0:?}. Please enter a valid IPv4 address (e.g., 192.168.1.100)")]
    InvalidAddress(String),
}

fn denied_what(command: &Option<String>) -> &str {
    command.as_deref().unwrap_or("the request")
}

fn pairing_hint(pairing_requested: &bool) -> &'static str {
    if *pairing_requested {
        "; accept the pairing prompt on the TV and try again"
    } else {
        ""
    }
}

impl RokuError {
    /// The user-facing cause of this error
    pub fn cause(&self) -> ErrorCause {
        match self {
            RokuError::Unreachable { .. } | RokuError::NoDevice => ErrorCause::Unreachable,
            RokuError::AuthorizationRequired { .. } => ErrorCause::AuthorizationRequired,
            RokuError::ProtocolViolation { .. } | RokuError::InvalidAddress(_) => {
                ErrorCause::ProtocolViolation
            }
            RokuError::Unsupported { .. } => ErrorCause::Unsupported,
            RokuError::Cancelled | RokuError::NoRuntime => ErrorCause::Cancelled,
            RokuError::Exhausted { .. } => ErrorCause::Exhausted,
        }
    }

    /// The device address involved, when there was one
    pub fn address(&self) -> Option<Ipv4Addr> {
        match self {
            RokuError::Unreachable { address, .. }
            | RokuError::AuthorizationRequired { address, .. }
            | RokuError::ProtocolViolation { address, .. } => Some(*address),
            _ => None,
        }
    }
}
