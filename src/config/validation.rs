//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that every backend address is dialable over plain HTTP
//! - Validate value ranges (timeouts > 0, ports valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::config::schema::BalancerConfig;
use crate::load_balancer::backend::BackendAddress;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.port must not be 0")]
    ZeroPort,

    #[error("invalid listener.receive_path {path:?}: {reason}")]
    InvalidReceivePath { path: String, reason: &'static str },

    #[error("listener.max_body_bytes must be greater than 0")]
    ZeroBodyLimit,

    #[error("outgoing.max_response_bytes must be greater than 0")]
    ZeroResponseLimit,

    #[error("outgoing.servers must list at least one backend")]
    NoBackends,

    #[error("invalid backend address {address:?}: {reason}")]
    InvalidBackend { address: String, reason: String },

    #[error("invalid allowed IP {0:?}")]
    InvalidAllowedIp(String),

    #[error("{0} must be greater than 0")]
    ZeroDuration(&'static str),

    #[error("queue.capacity must be greater than 0")]
    ZeroQueueCapacity,

    #[error("invalid log level {0:?}")]
    InvalidLogLevel(String),

    #[error("invalid metrics address {0:?}")]
    InvalidMetricsAddress(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listener = &config.listener;
    if listener.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }
    if let Err(reason) = check_receive_path(&listener.receive_path) {
        errors.push(ValidationError::InvalidReceivePath {
            path: listener.receive_path.clone(),
            reason,
        });
    }
    if listener.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if config.outgoing.servers.is_empty() {
        errors.push(ValidationError::NoBackends);
    }
    for address in &config.outgoing.servers {
        if let Err(e) = BackendAddress::parse(address) {
            errors.push(ValidationError::InvalidBackend {
                address: address.clone(),
                reason: e.to_string(),
            });
        }
    }
    if config.outgoing.max_response_bytes == 0 {
        errors.push(ValidationError::ZeroResponseLimit);
    }
    if config.outgoing.forward_timeout_secs == 0 {
        errors.push(ValidationError::ZeroDuration("outgoing.forward_timeout_secs"));
    }

    for ip in &config.incoming.allowed_ips {
        if ip.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::InvalidAllowedIp(ip.clone()));
        }
    }

    if config.health_check.interval_ms == 0 {
        errors.push(ValidationError::ZeroDuration("health_check.interval_ms"));
    }
    if config.health_check.dial_timeout_secs == 0 {
        errors.push(ValidationError::ZeroDuration("health_check.dial_timeout_secs"));
    }

    if config.queue.capacity == 0 {
        errors.push(ValidationError::ZeroQueueCapacity);
    }
    if config.queue.retry_delay_ms == 0 {
        errors.push(ValidationError::ZeroDuration("queue.retry_delay_ms"));
    }

    let observability = &config.observability;
    if observability.log_level.parse::<LevelFilter>().is_err() {
        errors.push(ValidationError::InvalidLogLevel(
            observability.log_level.clone(),
        ));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// The receive path is a literal route: no captures or wildcards.
fn check_receive_path(path: &str) -> Result<(), &'static str> {
    if !path.starts_with('/') {
        return Err("must start with '/'");
    }
    if path.contains(['{', '}']) {
        return Err("must not contain '{' or '}'");
    }
    if path
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
    {
        return Err("segments must not start with ':' or '*'");
    }
    Ok(())
}
