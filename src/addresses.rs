//! Candidate address enumeration and dotted-quad validation.

use crate::error::{Result, RokuError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Common home-router subnets, scanned in this order after any detected subnet
pub const DEFAULT_FALLBACK_PREFIXES: [SubnetPrefix; 6] = [
    SubnetPrefix([192, 168, 1]),
    SubnetPrefix([192, 168, 0]),
    SubnetPrefix([10, 0, 0]),
    SubnetPrefix([10, 0, 1]),
    SubnetPrefix([192, 168, 2]),
    SubnetPrefix([172, 16, 0]),
];

const FIRST_HOST: u8 = 1;
const LAST_HOST: u8 = 254;

/// The first three octets of a /24 network, e.g. `192.168.1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubnetPrefix(pub [u8; 3]);

impl SubnetPrefix {
    /// Prefix of the /24 network containing `address`
    pub fn of(address: Ipv4Addr) -> Self {
        let [a, b, c, _] = address.octets();
        Self([a, b, c])
    }

    /// Full address of `host` within this prefix
    pub fn host(&self, host: u8) -> Ipv4Addr {
        let [a, b, c] = self.0;
        Ipv4Addr::new(a, b, c, host)
    }
}

impl fmt::Display for SubnetPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a}.{b}.{c}")
    }
}

impl FromStr for SubnetPrefix {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let octets: Vec<u8> = s
            .trim()
            .trim_end_matches('.')
            .split('.')
            .map(parse_octet)
            .collect::<Option<_>>()
            .ok_or_else(|| format!("invalid subnet prefix: {s:?}"))?;

        match octets.as_slice() {
            [a, b, c] => Ok(Self([*a, *b, *c])),
            _ => Err(format!("subnet prefix needs three octets: {s:?}")),
        }
    }
}

impl TryFrom<String> for SubnetPrefix {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SubnetPrefix> for String {
    fn from(prefix: SubnetPrefix) -> Self {
        prefix.to_string()
    }
}

/// A host to probe, together with the subnet it was generated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateAddress {
    pub address: Ipv4Addr,
    pub prefix: SubnetPrefix,
}

/// Ordered set of subnets to scan
///
/// Iteration is lazy and restartable: every call to [`AddressSpace::candidates`]
/// starts again from the first host of the highest-priority prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpace {
    prefixes: Vec<SubnetPrefix>,
}

impl AddressSpace {
    /// Build the scan order: the detected prefix first, then the fallbacks.
    /// Duplicates keep their first position.
    pub fn new(detected: Option<SubnetPrefix>, fallback: &[SubnetPrefix]) -> Self {
        let mut prefixes: Vec<SubnetPrefix> = Vec::with_capacity(fallback.len() + 1);
        for prefix in detected.into_iter().chain(fallback.iter().copied()) {
            if !prefixes.contains(&prefix) {
                prefixes.push(prefix);
            }
        }
        Self { prefixes }
    }

    /// Prefixes in scan order
    pub fn prefixes(&self) -> &[SubnetPrefix] {
        &self.prefixes
    }

    /// Total number of candidates
    pub fn len(&self) -> usize {
        self.prefixes.len() * usize::from(LAST_HOST - FIRST_HOST + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Candidates in priority order, hosts ascending within a prefix
    pub fn candidates(&self) -> impl Iterator<Item = CandidateAddress> + '_ {
        self.prefixes.iter().flat_map(|prefix| {
            (FIRST_HOST..=LAST_HOST).map(move |host| CandidateAddress {
                address: prefix.host(host),
                prefix: *prefix,
            })
        })
    }
}

/// Accepts exactly four dot-separated decimal segments, each in `0..=255`.
///
/// Leading zeros are tolerated (`010.0.0.1` is `10.0.0.1`), unlike
/// [`Ipv4Addr::from_str`].
pub fn is_valid_address(text: &str) -> bool {
    parse_address(text).is_ok()
}

/// Parse a manually entered device address
pub fn parse_address(text: &str) -> Result<Ipv4Addr> {
    let octets: Option<Vec<u8>> = text.split('.').map(parse_octet).collect();

    match octets.as_deref() {
        Some([a, b, c, d]) => Ok(Ipv4Addr::new(*a, *b, *c, *d)),
        _ => Err(RokuError::InvalidAddress(text.to_string())),
    }
}

fn parse_octet(segment: &str) -> Option<u8> {
    if segment.is_empty() || segment.len() > 3 || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse::<u16>().ok().and_then(|n| u8::try_from(n).ok())
}
