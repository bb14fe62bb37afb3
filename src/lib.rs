//! POST load balancer library.
//!
//! Accepts POST requests on one path and relays each to exactly one backend
//! that is alive and not already serving a request. Requests that find every
//! backend busy wait in a bounded queue until one frees up.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod proxy;
pub mod security;

pub use config::schema::BalancerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::Balancer;
