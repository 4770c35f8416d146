//! Roku External Control Protocol (ECP) request shapes and response parsing.

use crate::types::DeviceCapabilities;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::LazyLock;
use std::time::Duration;

/// TCP port the control protocol listens on
pub const CONTROL_PORT: u16 = 8060;

/// Status query used to probe a device
pub const DEVICE_INFO_PATH: &str = "query/device-info";

/// A device-info body must contain this tag to count as a Roku
pub const DEVICE_INFO_MARKER: &str = "<device-info";

static LEAF_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Za-z0-9-]+)>([^<]*)</([A-Za-z0-9-]+)>").expect("static regex is valid")
});

/// HTTP method used by a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// A single request to a device's control port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcpRequest {
    pub address: Ipv4Addr,
    pub method: Method,
    /// Path relative to the control port root, without a leading slash
    pub path: String,
    pub timeout: Duration,
}

impl EcpRequest {
    pub fn new(address: Ipv4Addr, method: Method, path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address,
            method,
            path: path.into(),
            timeout,
        }
    }

    /// `GET /query/device-info`
    pub fn device_info(address: Ipv4Addr, timeout: Duration) -> Self {
        Self::new(address, Method::Get, DEVICE_INFO_PATH, timeout)
    }

    /// `POST` of a translated command
    pub fn command(address: Ipv4Addr, token: &CommandToken, timeout: Duration) -> Self {
        Self::new(address, Method::Post, token.path(), timeout)
    }
}

/// Raw HTTP reply, status and body passed through unchanged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx and 3xx count as accepted; the device does not redirect
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// Protocol-level form of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandToken {
    /// Remote keypress, e.g. `VolumeUp`
    Key(&'static str),
    /// Channel launch by numeric application id
    Launch(u32),
}

impl CommandToken {
    pub fn path(&self) -> String {
        match self {
            CommandToken::Key(key) => format!("keypress/{key}"),
            CommandToken::Launch(app_id) => format!("launch/{app_id}"),
        }
    }
}

impl fmt::Display for CommandToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandToken::Key(key) => f.write_str(key),
            CommandToken::Launch(app_id) => write!(f, "Launch.{app_id}"),
        }
    }
}

/// Whether `body` is a device self-description
pub fn is_device_info(body: &str) -> bool {
    body.contains(DEVICE_INFO_MARKER)
}

/// Extract capability fields from a device-info body.
///
/// Returns `None` when the marker is missing. Absent fields stay empty and
/// absent flags read as `false`.
pub fn parse_device_info(body: &str) -> Option<DeviceCapabilities> {
    if !is_device_info(body) {
        return None;
    }

    let fields = leaf_elements(body);
    let text = |tag: &str| {
        fields
            .get(tag)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let flag = |tag: &str| {
        fields
            .get(tag)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    };

    Some(DeviceCapabilities {
        device_name: text("user-device-name").or_else(|| text("friendly-device-name")),
        model_name: text("model-name"),
        model_number: text("model-number"),
        is_display: flag("is-tv"),
        requires_pairing: flag("requires-pairing"),
    })
}

/// Map of `<tag>text</tag>` leaf elements; the first occurrence of a tag wins
fn leaf_elements(body: &str) -> BTreeMap<&str, &str> {
    let mut fields = BTreeMap::new();
    for caps in LEAF_ELEMENT.captures_iter(body) {
        let (Some(open), Some(value), Some(close)) = (caps.get(1), caps.get(2), caps.get(3)) else {
            continue;
        };
        if open.as_str() == close.as_str() {
            fields.entry(open.as_str()).or_insert(value.as_str());
        }
    }
    fields
}
