//! Reference upstream: a static origin behind a reverse proxy

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use std::time::Duration;

use super::origin::{parse_origin, UpstreamError};
use super::reverse_proxy::ReverseProxy;
use super::Upstream;

/// A single origin with its own reverse proxy and HTTP client
pub struct ProxyUpstream {
    address: String,
    proxy: ReverseProxy,
}

impl ProxyUpstream {
    /// Construct an upstream with no request timeout
    pub fn new(address: impl Into<String>) -> Result<Self, UpstreamError> {
        Self::with_timeout(address, None)
    }

    /// Construct an upstream whose origin round trips are bounded by `timeout`
    pub fn with_timeout(
        address: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, UpstreamError> {
        let address = address.into();
        let target = parse_origin(&address)?;
        let proxy = ReverseProxy::new(target, timeout)?;
        Ok(Self { address, proxy })
    }
}

#[async_trait]
impl Upstream for ProxyUpstream {
    fn address(&self) -> &str {
        &self.address
    }

    // No health checking is performed; every configured origin is eligible.
    fn is_live(&self) -> bool {
        true
    }

    async fn serve(&self, req: Request<Body>) -> Response {
        self.proxy.forward(req).await
    }
}
