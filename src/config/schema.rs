//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the load balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// Inbound listener settings (port, receive path, limits).
    pub listener: ListenerConfig,

    /// Caller admission settings.
    pub incoming: IncomingConfig,

    /// Backend pool and forwarding settings.
    pub outgoing: OutgoingConfig,

    /// Availability probing.
    pub health_check: HealthCheckConfig,

    /// Admission queue for requests that find no free backend.
    pub queue: QueueConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind.
    pub bind_host: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Path that accepts POST requests for forwarding.
    pub receive_path: String,

    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,

    /// Caller-side deadline for the whole exchange, queueing included.
    /// Zero leaves requests unbounded.
    pub request_timeout_secs: u64,
}

impl ListenerConfig {
    /// The `host:port` string to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8080,
            receive_path: "/".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            request_timeout_secs: 0,
        }
    }
}

/// Caller admission configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IncomingConfig {
    /// Caller IPs allowed to use the balancer. Empty allows everyone.
    pub allowed_ips: Vec<String>,

    /// Resolve the caller from the `X-Real-IP` header when present.
    ///
    /// Only safe behind a proxy that sets the header itself. Otherwise any
    /// caller can name an allowed address and pass the allowlist.
    pub trust_real_ip_header: bool,
}

impl IncomingConfig {
    /// The allowlist is enforced against a caller-supplied header.
    pub fn allowlist_trusts_header(&self) -> bool {
        self.trust_real_ip_header && !self.allowed_ips.is_empty()
    }
}

impl Default for IncomingConfig {
    fn default() -> Self {
        Self {
            allowed_ips: Vec::new(),
            trust_real_ip_header: true,
        }
    }
}

/// Backend pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutgoingConfig {
    /// Backend addresses in selection order (e.g. "http://10.0.0.5:9000/receive").
    pub servers: Vec<String>,

    /// Deadline for a single forward attempt in seconds.
    pub forward_timeout_secs: u64,

    /// Largest backend response body relayed; larger ones become 502.
    pub max_response_bytes: usize,
}

impl OutgoingConfig {
    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_secs)
    }
}

impl Default for OutgoingConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            forward_timeout_secs: 10,
            max_response_bytes: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// Availability probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the periodic TCP probe.
    pub enabled: bool,

    /// Probe cycle interval in milliseconds.
    pub interval_ms: u64,

    /// Dial timeout for a single probe in seconds.
    pub dial_timeout_secs: u64,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5000,
            dial_timeout_secs: 5,
        }
    }
}

/// Admission queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of requests waiting for a backend.
    pub capacity: usize,

    /// Fallback delay between claim attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl QueueConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            retry_delay_ms: 100,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Console log format.
    pub log_format: LogFormat,

    /// Directory for log files. Created at startup when missing.
    pub log_dir: Option<PathBuf>,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            log_dir: None,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
