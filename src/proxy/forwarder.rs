//! Forwarding a request to a claimed backend.
//!
//! # Responsibilities
//! - Build the outbound request (same method, verbatim body, forwarding headers)
//! - Enforce the forward deadline over the whole exchange
//! - Classify the outcome (success, 5xx, timeout, network)
//! - Cap how much of a response body is buffered
//! - Release the claim exactly once, before the result is handed back

use std::error::Error as StdError;
use std::io;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::response::Parts;
use axum::http::{Request, Response};
use futures_util::StreamExt;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time;

use crate::load_balancer::{Backend, BackendClaim};
use crate::observability::{metrics, ACCESS_TARGET};
use crate::proxy::error::ForwardError;
use crate::proxy::InboundRequest;
use crate::security::headers;

/// Default cap on a buffered response body.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Sends requests to backends over a shared connection pool.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
    max_response_bytes: usize,
}

impl Forwarder {
    /// Create a forwarder whose attempts are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            timeout,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }

    /// Fail attempts whose response body is larger than `limit` bytes.
    pub fn with_max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = limit;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_response_bytes(&self) -> usize {
        self.max_response_bytes
    }

    /// Forward `request` to the claimed backend.
    ///
    /// The claim is released before this returns, whatever the outcome. If the
    /// returned future is dropped mid-flight the claim is released on drop.
    pub async fn forward(
        &self,
        claim: BackendClaim,
        request: &InboundRequest,
    ) -> Result<Response<Body>, ForwardError> {
        let start = Instant::now();
        let backend = claim.backend().address().to_string();

        let result = self.exchange(claim.backend(), request).await;
        claim.release();

        match result {
            Ok((parts, _)) if parts.status.is_server_error() => {
                tracing::error!(
                    backend = %backend,
                    status = %parts.status,
                    reason = "5xx",
                    "Backend returned error status"
                );
                metrics::record_failure(&backend, "5xx");
                Err(ForwardError::Status(parts.status))
            }
            Ok((mut parts, body)) => {
                tracing::info!(
                    target: ACCESS_TARGET,
                    backend = %backend,
                    caller = %request.caller_ip,
                    status = parts.status.as_u16(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Forwarded request"
                );
                metrics::record_forwarded(&backend, parts.status.as_u16(), start);

                headers::strip_hop_by_hop(&mut parts.headers);
                Ok(Response::from_parts(parts, Body::from(body)))
            }
            Err(e) => {
                let reason = e.reason();
                match &e {
                    ForwardError::Timeout(_) => {
                        tracing::warn!(backend = %backend, reason, error = %e, "Backend timed out")
                    }
                    ForwardError::Network(_) => {
                        tracing::warn!(backend = %backend, reason, error = %e, "Backend unreachable")
                    }
                    ForwardError::Status(_)
                    | ForwardError::ResponseTooLarge(_)
                    | ForwardError::Build(_) => {
                        tracing::error!(backend = %backend, reason, error = %e, "Forward failed")
                    }
                }
                metrics::record_failure(&backend, reason);
                Err(e)
            }
        }
    }

    /// Send the request and read the response, up to the size cap, within
    /// the deadline.
    async fn exchange(
        &self,
        backend: &Backend,
        request: &InboundRequest,
    ) -> Result<(Parts, Bytes), ForwardError> {
        let outbound = build_request(backend, request)?;

        let send = async {
            let response = self
                .client
                .request(outbound)
                .await
                .map_err(|e| classify_client_error(&e, self.timeout))?;
            let (parts, body) = response.into_parts();
            let bytes = read_capped(Body::new(body), self.max_response_bytes).await?;
            Ok((parts, bytes))
        };

        time::timeout(self.timeout, send)
            .await
            .map_err(|_| ForwardError::Timeout(self.timeout))?
    }
}

async fn read_capped(body: Body, limit: usize) -> Result<Bytes, ForwardError> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| ForwardError::Network(format!("reading response body: {e}")))?;
        if buf.len() + chunk.len() > limit {
            return Err(ForwardError::ResponseTooLarge(limit));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

fn build_request(backend: &Backend, request: &InboundRequest) -> Result<Request<Body>, ForwardError> {
    let headers = headers::forwarded_headers(&request.headers, request.caller_ip)
        .map_err(|e| ForwardError::Build(e.to_string()))?;

    let mut outbound = Request::new(Body::from(request.body.clone()));
    *outbound.method_mut() = request.method.clone();
    *outbound.uri_mut() = backend.address().uri().clone();
    *outbound.headers_mut() = headers;
    Ok(outbound)
}

/// Map a client error to a timeout when anything in its chain is one.
fn classify_client_error(
    err: &hyper_util::client::legacy::Error,
    timeout: Duration,
) -> ForwardError {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::TimedOut {
                return ForwardError::Timeout(timeout);
            }
        }
        if let Some(hyper_err) = cause.downcast_ref::<hyper::Error>() {
            if hyper_err.is_timeout() {
                return ForwardError::Timeout(timeout);
            }
        }
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    ForwardError::Network(message)
}
