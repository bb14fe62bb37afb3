//! Request identification and caller resolution.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for every inbound request
//! - Resolve the caller IP used for the allowlist and forwarding headers
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - `X-Real-IP` wins over the socket peer only when it is trusted and parses

use std::net::{IpAddr, SocketAddr};

use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::security::headers::X_REAL_IP;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Stamps requests that arrive without an ID.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdGenerator;

impl MakeRequestId for RequestIdGenerator {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// The address a request is attributed to.
pub fn resolve_caller_ip(headers: &HeaderMap, peer: SocketAddr, trust_real_ip: bool) -> IpAddr {
    if trust_real_ip {
        let real_ip = headers
            .get(&X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if let Some(ip) = real_ip {
            return ip;
        }
    }
    peer.ip().to_canonical()
}
