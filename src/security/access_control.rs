//! Caller IP allowlist.

use std::net::{AddrParseError, IpAddr};

/// IPs allowed to send requests through the balancer.
///
/// An empty list allows every caller.
#[derive(Debug, Clone, Default)]
pub struct AccessList {
    allowed: Vec<IpAddr>,
}

impl AccessList {
    pub fn new(allowed: Vec<IpAddr>) -> Self {
        Self {
            allowed: allowed.into_iter().map(|ip| ip.to_canonical()).collect(),
        }
    }

    /// Build from configured strings.
    pub fn parse<S: AsRef<str>>(allowed: &[S]) -> Result<Self, AddrParseError> {
        let ips = allowed
            .iter()
            .map(|ip| ip.as_ref().trim().parse())
            .collect::<Result<Vec<IpAddr>, _>>()?;
        Ok(Self::new(ips))
    }

    /// Allow all callers.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Whether `ip` may use the balancer. IPv4-mapped IPv6 callers match
    /// their IPv4 entry.
    pub fn is_allowed(&self, ip: IpAddr) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&ip.to_canonical())
    }
}
