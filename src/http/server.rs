//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the single forwarding route
//! - Wire up middleware (request ID, tracing, body limit, optional timeout)
//! - Start the availability prober and the retry worker
//! - Serve until shutdown, then drain

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, State},
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::BalancerConfig;
use crate::health::AvailabilityProber;
use crate::http::request::{resolve_caller_ip, RequestIdGenerator, X_REQUEST_ID};
use crate::lifecycle::Shutdown;
use crate::observability::ACCESS_TARGET;
use crate::proxy::{Balancer, InboundRequest, RetryWorker, SetupError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub balancer: Balancer,
    pub trust_real_ip: bool,
}

/// HTTP front end of the load balancer.
pub struct HttpServer {
    router: Router,
    config: BalancerConfig,
    balancer: Balancer,
    worker: RetryWorker,
}

impl HttpServer {
    /// Build the server from a validated configuration.
    pub fn new(config: BalancerConfig) -> Result<Self, SetupError> {
        let (balancer, worker) = Balancer::from_config(&config)?;
        if config.incoming.allowlist_trusts_header() {
            tracing::warn!(
                "Allowlist is checked against X-Real-IP; callers can set it themselves \
                 unless a trusted proxy overwrites it"
            );
        }

        let state = AppState {
            balancer: balancer.clone(),
            trust_real_ip: config.incoming.trust_real_ip_header,
        };
        let router = Self::build_router(&config, state);

        Ok(Self {
            router,
            config,
            balancer,
            worker,
        })
    }

    #[allow(deprecated)]
    fn build_router(config: &BalancerConfig, state: AppState) -> Router {
        let path = &config.listener.receive_path;
        let mut router = Router::new().route(path, post(proxy_handler));
        // A path ending in '/' also covers everything below it.
        if path.ends_with('/') {
            router = router.route(&format!("{path}{{*rest}}"), post(proxy_handler));
        }
        let router = router
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.listener.max_body_bytes));

        let router = match config.listener.request_timeout_secs {
            0 => router,
            secs => router.layer(TimeoutLayer::new(Duration::from_secs(secs))),
        };

        router
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, RequestIdGenerator))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            receive_path = %self.config.listener.receive_path,
            backends = self.balancer.registry().len(),
            "HTTP server starting"
        );

        if self.config.health_check.enabled {
            let prober = AvailabilityProber::new(
                self.balancer.registry().clone(),
                &self.config.health_check,
            );
            tokio::spawn(prober.run(shutdown.subscribe()));
        } else {
            tracing::info!("Availability probing disabled");
        }

        tokio::spawn(self.worker.run(shutdown.subscribe()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.wait().await;
                tracing::info!("Draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    pub fn balancer(&self) -> &Balancer {
        &self.balancer
    }
}

/// Forward one POST to a backend and relay the outcome.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let caller_ip = resolve_caller_ip(&headers, peer, state.trust_real_ip);
    tracing::info!(
        target: ACCESS_TARGET,
        caller = %caller_ip,
        bytes = body.len(),
        "Request received"
    );

    let request = InboundRequest {
        method,
        headers,
        body,
        caller_ip,
    };

    match state.balancer.route(request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}
