//! Stub origins and upstreams shared by the unit tests

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::upstream::Upstream;

/// Serve `app` on an ephemeral local port
pub async fn spawn_origin(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Origin that answers every request with a fixed body
pub async fn text_origin(body: &'static str) -> SocketAddr {
    spawn_origin(Router::new().fallback(move || async move { body })).await
}

/// Origin that waits `delay` before answering
pub async fn slow_origin(delay: Duration) -> SocketAddr {
    spawn_origin(Router::new().fallback(move || async move {
        tokio::time::sleep(delay).await;
        "late"
    }))
    .await
}

/// Origin that answers with the given status and body
pub async fn status_origin(status: StatusCode, body: &'static str) -> SocketAddr {
    spawn_origin(Router::new().fallback(move || async move { (status, body) })).await
}

/// Origin that echoes the request back: body as body, request line and
/// selected headers as `x-echo-*` headers, and every `x-test-*` header as is.
pub async fn echo_origin() -> SocketAddr {
    spawn_origin(Router::new().fallback(echo)).await
}

async fn echo(req: Request<Body>) -> Response {
    let (parts, body) = req.into_parts();
    let body = to_bytes(body, usize::MAX).await.unwrap_or_default();

    let mut headers = HeaderMap::new();
    let to_value = |value: &str| HeaderValue::from_str(value).unwrap_or(HeaderValue::from_static("?"));
    headers.insert("x-echo-method", to_value(parts.method.as_str()));
    headers.insert("x-echo-uri", to_value(&parts.uri.to_string()));
    for (name, source) in [("x-echo-host", "host"), ("x-echo-forwarded-for", "x-forwarded-for")] {
        if let Some(value) = parts.headers.get(source) {
            headers.insert(name, value.clone());
        }
    }
    for (name, value) in parts.headers.iter() {
        if name.as_str().starts_with("x-test-") {
            headers.insert(name.clone(), value.clone());
        }
    }

    (StatusCode::OK, headers, body).into_response()
}

/// Origin that reads the request body chunk by chunk and answers with the
/// number of bytes it received
pub async fn byte_count_origin() -> SocketAddr {
    spawn_origin(Router::new().fallback(|body: Body| async move {
        let mut chunks = body.into_data_stream();
        let mut total = 0usize;
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(chunk) => total += chunk.len(),
                Err(_) => return (StatusCode::BAD_REQUEST, "body interrupted".to_string()),
            }
        }
        (StatusCode::OK, total.to_string())
    }))
    .await
}

/// Sets its flag when dropped
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Origin whose handler never finishes on its own
pub struct HangingOrigin {
    pub addr: SocketAddr,
    /// Notified once a request reaches the handler
    pub started: Arc<Notify>,
    /// Set when the server drops the handler, i.e. the connection closed
    pub abandoned: Arc<AtomicBool>,
}

pub async fn hanging_origin() -> HangingOrigin {
    let started = Arc::new(Notify::new());
    let abandoned = Arc::new(AtomicBool::new(false));

    let (on_start, on_drop) = (started.clone(), abandoned.clone());
    let app = Router::new().fallback(move || {
        let (on_start, on_drop) = (on_start.clone(), on_drop.clone());
        async move {
            let _guard = DropFlag(on_drop);
            on_start.notify_one();
            tokio::time::sleep(Duration::from_secs(60)).await;
            "late"
        }
    });

    HangingOrigin {
        addr: spawn_origin(app).await,
        started,
        abandoned,
    }
}

/// A local address nothing listens on
pub fn refused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// In-memory upstream with a switchable liveness flag; `serve` answers with
/// its name.
pub struct FlagUpstream {
    name: String,
    live: AtomicBool,
}

impl FlagUpstream {
    pub fn new(name: &str, live: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            live: AtomicBool::new(live),
        })
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }
}

#[async_trait]
impl Upstream for FlagUpstream {
    fn address(&self) -> &str {
        &self.name
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn serve(&self, _req: Request<Body>) -> Response {
        self.name.clone().into_response()
    }
}

/// Upcast a list of flag upstreams into a selector pool
pub fn pool_of(upstreams: &[Arc<FlagUpstream>]) -> Vec<Arc<dyn Upstream>> {
    upstreams
        .iter()
        .map(|u| u.clone() as Arc<dyn Upstream>)
        .collect()
}
