//! Per-request dispatch: pick an upstream, log the decision, hand off

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::balancer::LoadBalancer;
use crate::upstream::Upstream;

/// Routes each inbound request to the upstream chosen by the balancer
///
/// There is no retry: whatever the chosen upstream answers (including a 502
/// for an unreachable origin) is what the client gets.
pub struct Dispatcher {
    balancer: Arc<dyn LoadBalancer>,
}

impl Dispatcher {
    pub fn new(balancer: Arc<dyn LoadBalancer>) -> Self {
        Self { balancer }
    }

    /// Handle an incoming request
    pub async fn handle(&self, req: Request<Body>) -> Response {
        let upstream = match self.select().await {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    method = %req.method(),
                    path = %req.uri().path(),
                    "No upstream available"
                );
                return (StatusCode::SERVICE_UNAVAILABLE, e).into_response();
            }
        };

        tracing::info!(
            upstream = %upstream.address(),
            method = %req.method(),
            path = %req.uri().path(),
            "Forwarding request to {}",
            upstream.address()
        );

        upstream.serve(req).await
    }

    /// Selection that may block is moved to the blocking pool so the async
    /// workers keep serving while it waits.
    async fn select(&self) -> Result<Arc<dyn Upstream>, String> {
        if !self.balancer.may_block() {
            return self.balancer.select().map_err(|e| e.to_string());
        }

        let balancer = self.balancer.clone();
        match tokio::task::spawn_blocking(move || balancer.select()).await {
            Ok(selected) => selected.map_err(|e| e.to_string()),
            Err(e) => Err(format!("upstream selection aborted: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::{build_balancer, RoundRobinBalancer};
    use crate::config::{AllDownPolicy, AppConfig};
    use crate::proxy::{build_router, ProxyState};
    use crate::test_support::{
        echo_origin, pool_of, refused_addr, status_origin, text_origin, FlagUpstream,
    };
    use crate::upstream::build_pool;
    use axum::body::to_bytes;
    use axum::Router;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tower::ServiceExt;

    fn router_for(origins: &[SocketAddr]) -> Router {
        let config = AppConfig {
            upstreams: origins.iter().map(|o| format!("http://{o}")).collect(),
            ..AppConfig::default()
        };
        let pool = build_pool(&config).unwrap();
        let balancer = build_balancer(pool, config.selection.when_all_down).unwrap();
        build_router(ProxyState { balancer })
    }

    async fn get_body(router: &Router, path: &str) -> (StatusCode, String) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn test_requests_rotate_across_origins() {
        let origins = [
            text_origin("A").await,
            text_origin("B").await,
            text_origin("C").await,
        ];
        let router = router_for(&origins);

        let mut bodies = Vec::new();
        for _ in 0..4 {
            let (status, body) = get_body(&router, "/").await;
            assert_eq!(status, StatusCode::OK);
            bodies.push(body);
        }
        assert_eq!(bodies, vec!["A", "B", "C", "A"]);
    }

    #[tokio::test]
    async fn test_every_path_and_method_is_dispatched() {
        let origins = [text_origin("A").await, text_origin("B").await];
        let router = router_for(&origins);

        let req = Request::builder()
            .method("DELETE")
            .uri("/deeply/nested/path?x=1")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (_, body) = get_body(&router, "/health").await;
        assert_eq!(body, "B");
    }

    #[tokio::test]
    async fn test_passthrough_matches_direct_origin_response() {
        let origin = echo_origin().await;
        let router = router_for(&[origin]);

        let direct = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap()
            .post(format!("http://{origin}/submit?id=9"))
            .header("x-test-trace", "abc-123")
            .body("distinct body \u{2713}")
            .send()
            .await
            .unwrap();
        let direct_status = direct.status();
        let mut direct_headers = direct.headers().clone();
        let direct_body = direct.bytes().await.unwrap();

        let req = Request::builder()
            .method("POST")
            .uri("/submit?id=9")
            .header("x-test-trace", "abc-123")
            .body(Body::from("distinct body \u{2713}"))
            .unwrap();
        let proxied = router.oneshot(req).await.unwrap();
        let proxied_status = proxied.status();
        let mut proxied_headers = proxied.headers().clone();
        let proxied_body = to_bytes(proxied.into_body(), usize::MAX).await.unwrap();

        direct_headers.remove("date");
        proxied_headers.remove("date");

        assert_eq!(proxied_status, direct_status);
        assert_eq!(proxied_headers, direct_headers);
        assert_eq!(proxied_body, direct_body);
        assert_eq!(proxied_headers.get("x-test-trace").unwrap(), "abc-123");
    }

    #[tokio::test]
    async fn test_origin_error_status_is_relayed() {
        let origin = status_origin(StatusCode::INTERNAL_SERVER_ERROR, "boom").await;
        let router = router_for(&[origin]);

        let (status, body) = get_body(&router, "/").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "boom");
    }

    #[tokio::test]
    async fn test_unreachable_origin_is_not_retried() {
        let origins = [refused_addr(), text_origin("B").await];
        let router = router_for(&origins);

        let (status, _) = get_body(&router, "/").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, body) = get_body(&router, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "B");
    }

    #[tokio::test]
    async fn test_all_down_pool_returns_service_unavailable() {
        let upstreams = [FlagUpstream::new("a", false), FlagUpstream::new("b", false)];
        let balancer =
            RoundRobinBalancer::with_policy(pool_of(&upstreams), AllDownPolicy::Fail).unwrap();
        let dispatcher = Dispatcher::new(Arc::new(balancer));

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = dispatcher.handle(req).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        upstreams[0].set_live(true);
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = dispatcher.handle(req).await;
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"a");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_spread_evenly() {
        let origins = [
            text_origin("A").await,
            text_origin("B").await,
            text_origin("C").await,
        ];
        let router = router_for(&origins);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..30 {
            let router = router.clone();
            tasks.spawn(async move { get_body(&router, "/").await });
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        while let Some(result) = tasks.join_next().await {
            let (status, body) = result.unwrap();
            assert_eq!(status, StatusCode::OK);
            *counts.entry(body).or_default() += 1;
        }
        assert_eq!(counts.get("A"), Some(&10));
        assert_eq!(counts.get("B"), Some(&10));
        assert_eq!(counts.get("C"), Some(&10));
    }

    #[tokio::test]
    async fn test_spin_selection_leaves_runtime_responsive() {
        let upstreams = [FlagUpstream::new("a", false), FlagUpstream::new("b", false)];
        let balancer =
            RoundRobinBalancer::with_policy(pool_of(&upstreams), AllDownPolicy::Spin).unwrap();
        let dispatcher = Dispatcher::new(Arc::new(balancer));

        // Runs on the same single-threaded runtime as the dispatch below.
        let b = upstreams[1].clone();
        let reviver = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            b.set_live(true);
        });

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = tokio::time::timeout(Duration::from_secs(5), dispatcher.handle(req))
            .await
            .expect("dispatch did not finish after an upstream came back");
        reviver.await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"b");
    }
}
