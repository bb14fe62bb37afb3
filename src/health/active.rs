//! Active availability probing.
//!
//! # Responsibilities
//! - Periodically dial every backend's host and port
//! - Flip the alive flag on each backend to the probe result
//! - Log transitions; record the alive gauge

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::load_balancer::{BackendAddress, ServerRegistry};
use crate::observability::metrics;

pub struct AvailabilityProber {
    registry: Arc<ServerRegistry>,
    interval: Duration,
    dial_timeout: Duration,
}

impl AvailabilityProber {
    pub fn new(registry: Arc<ServerRegistry>, config: &HealthCheckConfig) -> Self {
        Self {
            registry,
            interval: config.interval(),
            dial_timeout: config.dial_timeout(),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            dial_timeout_ms = self.dial_timeout.as_millis() as u64,
            backends = self.registry.len(),
            "Availability prober starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Availability prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every backend concurrently and apply the results.
    pub async fn probe_all(&self) {
        let probes = self
            .registry
            .backends()
            .iter()
            .map(|backend| probe(backend.address(), self.dial_timeout));
        let results = join_all(probes).await;

        for (backend, alive) in self.registry.backends().iter().zip(results) {
            let was_alive = self.registry.set_alive(backend.id(), alive);
            let address = backend.address().as_str();

            match (was_alive, alive) {
                (true, false) => tracing::warn!(backend = %address, "Backend down"),
                (false, true) => tracing::info!(backend = %address, "Backend up"),
                _ => tracing::debug!(backend = %address, alive, "Probe complete"),
            }
            metrics::record_backend_alive(address, alive);
        }
    }
}

/// A backend is alive when a TCP connection to it opens within `timeout`.
pub async fn probe(address: &BackendAddress, timeout: Duration) -> bool {
    let (host, port) = address.dial_target();
    matches!(
        time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}
