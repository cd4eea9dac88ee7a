//! HTTP client used to talk to the balancer

use reqwest::{Client, Method};

use crate::types::ProxyResponse;

/// Build an HTTP client (no connection pooling for test isolation)
pub fn build_client() -> Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .expect("Failed to build reqwest client")
}

/// Send a GET request through the balancer
pub async fn send_get(client: &Client, proxy_addr: &str, path: &str) -> anyhow::Result<ProxyResponse> {
    send(client, proxy_addr, Method::GET, path, &[], Vec::new()).await
}

/// Send an arbitrary request through the balancer and collect the full response
pub async fn send(
    client: &Client,
    proxy_addr: &str,
    method: Method,
    path: &str,
    headers: &[(&str, &str)],
    body: Vec<u8>,
) -> anyhow::Result<ProxyResponse> {
    let url = format!("http://{proxy_addr}{path}");

    let mut request = client.request(method.clone(), &url);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    if !body.is_empty() {
        request = request.body(body);
    }

    let resp = request
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to {} {}: {}", method, url, e))?;

    let status = resp.status().as_u16();
    let headers = resp.headers().clone();
    let body = resp
        .bytes()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read response from {}: {}", url, e))?;

    Ok(ProxyResponse { status, headers, body })
}
