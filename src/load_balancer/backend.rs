//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single configured backend server
//! - Parse its address into a request URI and a dial target
//!
//! Liveness and claim state are not stored here; they live in the
//! registry behind its single lock.

use std::fmt;

use axum::http::Uri;
use thiserror::Error;
use url::{Host, Url};

/// Errors produced while parsing a backend address.
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("not a valid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported scheme {0:?} (only http is forwarded)")]
    UnsupportedScheme(String),

    #[error("missing host")]
    MissingHost,

    #[error("not a valid request URI: {0}")]
    Uri(#[from] axum::http::uri::InvalidUri),
}

/// A parsed backend address.
///
/// Accepts both full URLs (`http://10.0.0.5:9000/receive`) and bare
/// `host:port` pairs, which are treated as `http://host:port/`.
#[derive(Debug, Clone)]
pub struct BackendAddress {
    /// The address exactly as configured.
    raw: String,
    /// Target of the forwarded request.
    uri: Uri,
    /// Host part for TCP probes.
    host: String,
    /// Port for TCP probes (explicit or the scheme default).
    port: u16,
}

impl BackendAddress {
    /// Parse a configured address.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let raw = raw.trim();
        let url = if raw.contains("://") {
            Url::parse(raw)?
        } else {
            Url::parse(&format!("http://{raw}"))?
        };

        if url.scheme() != "http" {
            return Err(AddressError::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(AddressError::MissingHost),
        };
        let port = url.port_or_known_default().unwrap_or(80);
        let uri: Uri = url.as_str().parse()?;

        Ok(Self {
            raw: raw.to_string(),
            uri,
            host,
            port,
        })
    }

    /// URI the forwarded request is sent to.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Host and port dialled by the availability probe.
    pub fn dial_target(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    /// The address as it appeared in the configuration.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Position of a backend in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(pub(crate) usize);

impl BackendId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backend-{}", self.0)
    }
}

/// A single backend server. Immutable after load.
#[derive(Debug)]
pub struct Backend {
    id: BackendId,
    address: BackendAddress,
}

impl Backend {
    pub(crate) fn new(id: BackendId, address: BackendAddress) -> Self {
        Self { id, address }
    }

    pub fn id(&self) -> BackendId {
        self.id
    }

    pub fn address(&self) -> &BackendAddress {
        &self.address
    }
}
