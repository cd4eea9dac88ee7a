//! rr-proxy: round-robin HTTP load balancer
//!
//! Features:
//! - Round-robin selection over a fixed pool of origins
//! - Pluggable liveness gate per upstream (non-live origins are skipped)
//! - Single-host reverse proxying with streamed bodies
//! - YAML configuration with built-in defaults

pub mod balancer;
pub mod config;
pub mod proxy;
pub mod upstream;

#[cfg(test)]
mod test_support;

pub use balancer::{build_balancer, LoadBalancer};
pub use config::AppConfig;
pub use proxy::run_server;
pub use upstream::{ProxyUpstream, Upstream};
