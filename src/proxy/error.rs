//! Error types for forwarding and routing.

use std::net::{AddrParseError, IpAddr};
use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

use crate::load_balancer::AddressError;

/// Why a single forward attempt did not produce a relayable response.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// No complete response within the forward deadline.
    #[error("backend timed out after {0:?}")]
    Timeout(Duration),

    /// Connection refused, reset, DNS failure and similar.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a server error.
    #[error("backend returned {0}")]
    Status(StatusCode),

    /// The response body exceeded the configured limit.
    #[error("response body larger than {0} bytes")]
    ResponseTooLarge(usize),

    /// The outbound request could not be assembled.
    #[error("failed to build outbound request: {0}")]
    Build(String),
}

impl ForwardError {
    /// Transient failures are retried against another backend.
    pub fn is_transient(&self) -> bool {
        matches!(self, ForwardError::Timeout(_) | ForwardError::Network(_))
    }

    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ForwardError::Timeout(_) => "timeout",
            ForwardError::Network(_) => "network",
            ForwardError::Status(_) => "5xx",
            ForwardError::ResponseTooLarge(_) => "too_large",
            ForwardError::Build(_) => "build",
        }
    }
}

/// Terminal outcome of routing a request that did not succeed.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("caller {0} is not in the allowlist")]
    AccessDenied(IpAddr),

    #[error("admission queue is full")]
    QueueFull,

    #[error("load balancer is shutting down")]
    Unavailable,

    #[error(transparent)]
    Upstream(#[from] ForwardError),
}

impl RouteError {
    /// Status code reported to the caller.
    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::AccessDenied(_) => StatusCode::FORBIDDEN,
            RouteError::QueueFull | RouteError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            RouteError::Upstream(ForwardError::Build(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            RouteError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// A config that passed validation still failed to build the balancer.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid backend address: {0}")]
    Backend(#[from] AddressError),

    #[error("invalid allowlist entry: {0}")]
    AllowList(#[from] AddrParseError),
}
