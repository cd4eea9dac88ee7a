//! Upstream origins and the reverse proxy that forwards to them

mod node;
mod origin;
mod reverse_proxy;

pub use node::ProxyUpstream;
pub use origin::{parse_origin, UpstreamError};
pub use reverse_proxy::ReverseProxy;

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;

/// One backend origin the balancer can route to
///
/// The selector only needs `address` and `is_live`; `serve` is invoked by the
/// dispatcher once an upstream has been chosen.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Origin base URL, as configured
    fn address(&self) -> &str;

    /// Whether this origin may currently receive traffic.
    ///
    /// Called once per candidate inside the selector's critical section, so it
    /// must not block or perform I/O.
    fn is_live(&self) -> bool;

    /// Forward `req` to the origin and return its response.
    ///
    /// Origin failures are reported through the returned response (relayed
    /// status, or 502 for transport errors), never as an error of this call.
    async fn serve(&self, req: Request<Body>) -> Response;
}

/// Build the upstream pool described by `config`, preserving its order
pub fn build_pool(config: &AppConfig) -> Result<Vec<Arc<dyn Upstream>>, UpstreamError> {
    let timeout = config.upstream.timeout_seconds.map(Duration::from_secs);
    config
        .upstreams
        .iter()
        .map(|address| {
            let upstream = ProxyUpstream::with_timeout(address.clone(), timeout)?;
            Ok(Arc::new(upstream) as Arc<dyn Upstream>)
        })
        .collect()
}
