//! Mock origin servers
//!
//! Each origin answers with its own name, so tests can see which origin the
//! balancer picked. Every origin also exposes the same utility endpoints:
//! - `/echo/*`: echoes body, method, URI and `x-test-*` headers
//! - `/status/:code`: answers with the given status and the origin name

use axum::{
    body::{to_bytes, Body},
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use crate::types::{OriginState, Origins, SharedOriginState};

/// Handle any request not matched below - answer with the origin name
async fn handle_name(State(state): State<SharedOriginState>) -> String {
    let mut state = state.lock().unwrap();
    state.hits += 1;
    state.name.clone()
}

/// Handle /echo/* - reflect the request back
async fn handle_echo(State(state): State<SharedOriginState>, request: Request<Body>) -> Response {
    state.lock().unwrap().hits += 1;

    let (parts, body) = request.into_parts();
    let body = to_bytes(body, 10 * 1024 * 1024).await.unwrap_or_default();

    let mut headers = HeaderMap::new();
    if let Ok(v) = HeaderValue::from_str(parts.method.as_str()) {
        headers.insert("x-echo-method", v);
    }
    if let Ok(v) = HeaderValue::from_str(&parts.uri.to_string()) {
        headers.insert("x-echo-uri", v);
    }
    if let Some(v) = parts.headers.get("x-forwarded-for") {
        headers.insert("x-echo-forwarded-for", v.clone());
    }
    for (name, value) in parts.headers.iter() {
        if name.as_str().starts_with("x-test-") {
            headers.insert(name.clone(), value.clone());
        }
    }

    (StatusCode::OK, headers, body).into_response()
}

/// Handle /status/:code
async fn handle_status(
    State(state): State<SharedOriginState>,
    Path(code): Path<u16>,
) -> Response {
    let name = {
        let mut state = state.lock().unwrap();
        state.hits += 1;
        state.name.clone()
    };
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, name).into_response()
}

/// Start one origin per name on consecutive ports starting at `first_port`
pub async fn start(first_port: u16, names: &[&str]) -> anyhow::Result<Origins> {
    let mut origins = Origins::default();

    for (offset, name) in names.iter().enumerate() {
        let state: SharedOriginState = Arc::new(Mutex::new(OriginState {
            name: name.to_string(),
            hits: 0,
        }));

        let app = Router::new()
            .route("/echo", any(handle_echo))
            .route("/echo/*rest", any(handle_echo))
            .route("/status/:code", any(handle_status))
            .fallback(handle_name)
            .with_state(state.clone());

        let addr = SocketAddr::from(([127, 0, 0, 1], first_port + offset as u16));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind mock origin {} to {}: {}", name, addr, e))?;

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock origin failed");
        });

        origins.states.push(state);
    }

    Ok(origins)
}
