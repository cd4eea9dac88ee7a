//! Listener and router wiring

use axum::{extract::State, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handler::Dispatcher;
use crate::balancer::LoadBalancer;
use crate::config::AppConfig;

/// Shared state for the proxy
#[derive(Clone)]
pub struct ProxyState {
    pub balancer: Arc<dyn LoadBalancer>,
}

/// Router that sends every method and path to the dispatcher
pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured listener and serve until the process exits
pub async fn run_server(
    config: AppConfig,
    balancer: Arc<dyn LoadBalancer>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(config.server.listen_addr()).await?;
    let local_addr = listener.local_addr()?;

    let upstreams: Vec<String> = balancer
        .all_upstreams()
        .iter()
        .map(|u| u.address().to_string())
        .collect();
    tracing::info!(
        strategy = balancer.strategy_name(),
        upstreams = ?upstreams,
        "Upstream pool ready"
    );

    let app = build_router(ProxyState { balancer });

    tracing::info!(addr = %local_addr, "Server listening on port {}", local_addr.port());

    Ok(axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?)
}

/// Catch-all handler
async fn dispatch(
    State(state): State<ProxyState>,
    req: axum::extract::Request,
) -> axum::response::Response {
    let dispatcher = Dispatcher::new(state.balancer);
    dispatcher.handle(req).await
}
