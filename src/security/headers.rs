//! Header manipulation for forwarded requests and relayed responses.
//!
//! # Responsibilities
//! - Append the caller to X-Forwarded-For, set X-Real-IP
//! - Drop framing and hop-by-hop headers the HTTP client recomputes
//! - Strip hop-by-hop headers from relayed responses

use std::net::IpAddr;

use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, CONNECTION, CONTENT_LENGTH, HOST,
    PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

/// Headers that describe a single connection rather than the message.
const HOP_BY_HOP: [HeaderName; 8] = [
    CONNECTION,
    KEEP_ALIVE,
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// Build the header set sent to a backend.
///
/// Every inbound header is kept except `Host` and message framing, which the
/// client derives from the outbound URI and body.
pub fn forwarded_headers(
    inbound: &HeaderMap,
    caller_ip: IpAddr,
) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = inbound.clone();
    headers.remove(HOST);
    headers.remove(CONTENT_LENGTH);
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }

    let caller = caller_ip.to_string();
    let chain = forwarded_for_chain(inbound, &caller);
    headers.insert(X_FORWARDED_FOR, HeaderValue::try_from(chain)?);
    headers.insert(X_REAL_IP, HeaderValue::try_from(caller)?);
    Ok(headers)
}

/// Existing X-Forwarded-For values joined in order, with `caller` appended.
fn forwarded_for_chain(inbound: &HeaderMap, caller: &str) -> String {
    let mut hops: Vec<&str> = inbound
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    hops.push(caller);
    hops.join(", ")
}

/// Remove hop-by-hop headers from a response before relaying it.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}
