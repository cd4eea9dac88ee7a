//! Single-host reverse proxy

use axum::{
    body::{Body, HttpBody},
    extract::ConnectInfo,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use url::Url;

use super::UpstreamError;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forwards requests to one fixed origin and relays the responses
pub struct ReverseProxy {
    target: Url,
    http_client: reqwest::Client,
}

impl ReverseProxy {
    /// Create a proxy for `target`. `timeout` bounds the whole round trip.
    pub fn new(target: Url, timeout: Option<Duration>) -> Result<Self, UpstreamError> {
        let mut client_builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .pool_max_idle_per_host(10);

        if let Some(timeout) = timeout {
            client_builder = client_builder.timeout(timeout);
        }

        Ok(Self {
            target,
            http_client: client_builder.build()?,
        })
    }

    /// Forward one request to the origin.
    ///
    /// Bodies are streamed in both directions. Dropping the returned future
    /// (client went away) aborts the origin request.
    pub async fn forward(&self, req: Request<Body>) -> Response {
        let (parts, body) = req.into_parts();
        let url = rewrite_url(&self.target, &parts.uri);

        let mut headers = parts.headers;
        headers.remove(header::HOST);
        strip_hop_by_hop(&mut headers);
        if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            append_forwarded_for(&mut headers, peer.ip());
        }

        // An empty inbound body stays empty; a stream would go out chunked.
        let outbound_body = if body.size_hint().exact() == Some(0) {
            None
        } else {
            Some(reqwest::Body::wrap_stream(body.into_data_stream()))
        };

        tracing::debug!(method = %parts.method, url = %url, "Building origin request");

        let mut origin_request = self.http_client.request(parts.method, url).headers(headers);
        if let Some(outbound_body) = outbound_body {
            origin_request = origin_request.body(outbound_body);
        }

        let result = origin_request.send().await;

        match result {
            Ok(origin_response) => relay_response(origin_response),
            Err(e) => {
                tracing::error!(upstream = %self.target, error = %e, "Proxy error");
                StatusCode::BAD_GATEWAY.into_response()
            }
        }
    }
}

/// Copy status, end-to-end headers and a streaming body from the origin
fn relay_response(origin_response: reqwest::Response) -> Response {
    let status = origin_response.status();
    let mut headers = origin_response.headers().clone();
    strip_hop_by_hop(&mut headers);

    let mut response = Response::new(Body::from_stream(origin_response.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Point `uri` at `target`: scheme and authority from the target, the target
/// path joined with the request path, and both queries combined.
pub(crate) fn rewrite_url(target: &Url, uri: &Uri) -> Url {
    let mut url = target.clone();
    url.set_path(&join_paths(target.path(), uri.path()));

    let target_query = target.query().filter(|q| !q.is_empty());
    let request_query = uri.query().filter(|q| !q.is_empty());
    let query = match (target_query, request_query) {
        (Some(t), Some(r)) => Some(format!("{t}&{r}")),
        (Some(q), None) | (None, Some(q)) => Some(q.to_string()),
        (None, None) => None,
    };
    url.set_query(query.as_deref());
    url
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

/// Remove hop-by-hop headers, including any listed in `Connection`
pub(crate) fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    for name in &listed {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

/// Append the client address to `X-Forwarded-For`, keeping prior hops
pub(crate) fn append_forwarded_for(headers: &mut HeaderMap, client_ip: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .collect();

    let value = if prior.is_empty() {
        client_ip.to_string()
    } else {
        format!("{}, {}", prior.join(", "), client_ip)
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
