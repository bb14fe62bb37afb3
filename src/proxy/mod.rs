//! Request routing subsystem.
//!
//! # Data Flow
//! ```text
//! InboundRequest
//!     → allowlist check (403 on miss)
//!     → try to claim a free alive backend
//!         claimed   → forwarder.rs → response, or transient failure → queue
//!         none free → admission.rs (bounded queue, 503 when full)
//!     → result delivered on the request's own channel
//! ```
//!
//! # Design Decisions
//! - A backend serves one request at a time; the claim is the only lock
//! - 5xx responses are final (502), network failures and timeouts retry
//! - The queue worker is the single consumer; forwards run concurrently

pub mod admission;
pub mod error;
pub mod forwarder;

use std::net::IpAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Response};

use crate::config::{BalancerConfig, QueueConfig};
use crate::load_balancer::ServerRegistry;
use crate::observability::metrics;
use crate::security::AccessList;

pub use admission::{AdmissionQueue, PendingRequest, RetryWorker};
pub use error::{ForwardError, RouteError, SetupError};
pub use forwarder::Forwarder;

/// Outcome of routing one request.
pub type RouteResult = Result<Response<Body>, RouteError>;

/// A fully read caller request, replayable against any backend.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub caller_ip: IpAddr,
}

/// Routes requests to backends, queueing when all are busy.
#[derive(Clone)]
pub struct Balancer {
    registry: Arc<ServerRegistry>,
    forwarder: Forwarder,
    access: Arc<AccessList>,
    queue: AdmissionQueue,
}

impl Balancer {
    /// Create a balancer and the worker that drains its queue. The worker
    /// must be spawned for queued requests to make progress.
    pub fn new(
        registry: Arc<ServerRegistry>,
        forwarder: Forwarder,
        access: AccessList,
        queue: &QueueConfig,
    ) -> (Self, RetryWorker) {
        let (admission, rx) = AdmissionQueue::new(queue.capacity);
        let worker = RetryWorker::new(
            rx,
            admission.clone(),
            Arc::clone(&registry),
            forwarder.clone(),
            queue.retry_delay(),
        );
        let balancer = Self {
            registry,
            forwarder,
            access: Arc::new(access),
            queue: admission,
        };
        (balancer, worker)
    }

    pub fn from_config(config: &BalancerConfig) -> Result<(Self, RetryWorker), SetupError> {
        let registry = ServerRegistry::from_addresses(&config.outgoing.servers)?;
        let access = AccessList::parse(&config.incoming.allowed_ips)?;
        let forwarder = Forwarder::new(config.outgoing.forward_timeout())
            .with_max_response_bytes(config.outgoing.max_response_bytes);
        Ok(Self::new(registry, forwarder, access, &config.queue))
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    /// Route one request to completion.
    pub async fn route(&self, request: InboundRequest) -> RouteResult {
        if !self.access.is_allowed(request.caller_ip) {
            tracing::warn!(caller = %request.caller_ip, "Access denied");
            metrics::record_denied();
            return Err(RouteError::AccessDenied(request.caller_ip));
        }

        let Some(claim) = self.registry.try_claim() else {
            tracing::debug!(caller = %request.caller_ip, "No backend free, queueing");
            return self.queue.submit(request, None).await;
        };

        let backend = claim.id();
        match self.forwarder.forward(claim, &request).await {
            Err(e) if e.is_transient() => {
                tracing::debug!(
                    backend = %backend,
                    reason = e.reason(),
                    "Queueing after transient failure"
                );
                self.queue.submit(request, Some(backend)).await
            }
            result => result.map_err(RouteError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::broadcast;

    async fn serve(router: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        addr
    }

    fn request_from(ip: &str) -> InboundRequest {
        InboundRequest {
            method: Method::POST,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"hello"),
            caller_ip: ip.parse().unwrap(),
        }
    }

    fn balancer(servers: &[String], allowed: &[&str]) -> (Balancer, broadcast::Sender<()>) {
        let registry = ServerRegistry::from_addresses(servers).unwrap();
        let access = AccessList::parse(allowed).unwrap();
        let (balancer, worker) = Balancer::new(
            registry,
            Forwarder::new(Duration::from_secs(5)),
            access,
            &QueueConfig::default(),
        );
        let (tx, rx) = broadcast::channel(1);
        tokio::spawn(worker.run(rx));
        (balancer, tx)
    }

    #[tokio::test]
    async fn caller_outside_allowlist_is_denied() {
        let (balancer, _shutdown) = balancer(&["http://127.0.0.1:1".to_string()], &["10.0.0.1"]);

        let err = balancer.route(request_from("10.0.0.2")).await.unwrap_err();
        assert!(matches!(err, RouteError::AccessDenied(_)));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        // Denied requests never touch a backend.
        assert_eq!(balancer.registry().claim_counts(), (0, 0));
    }

    #[tokio::test]
    async fn busy_backend_queues_then_serves() {
        let backend = serve(Router::new().route(
            "/",
            post(|body: Bytes| async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                body
            }),
        ))
        .await;
        let (balancer, _shutdown) = balancer(&[format!("http://{backend}/")], &[]);

        let first = tokio::spawn({
            let balancer = balancer.clone();
            async move { balancer.route(request_from("10.0.0.1")).await }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = balancer.route(request_from("10.0.0.1")).await.unwrap();

        assert_eq!(first.await.unwrap().unwrap().status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(balancer.registry().claim_counts(), (2, 2));
        assert_eq!(balancer.queue().depth(), 0);
    }

    #[tokio::test]
    async fn transient_failure_moves_to_another_backend() {
        let dead = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let live = serve(Router::new().route("/", post(|| async { "served" }))).await;
        let (balancer, _shutdown) =
            balancer(&[format!("http://{dead}/"), format!("http://{live}/")], &[]);

        let response = balancer.route(request_from("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn server_error_is_not_retried() {
        let backend = serve(Router::new().route(
            "/",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        ))
        .await;
        let (balancer, _shutdown) = balancer(&[format!("http://{backend}/")], &[]);

        let err = balancer.route(request_from("10.0.0.1")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(balancer.registry().claim_counts(), (1, 1));
    }
}
