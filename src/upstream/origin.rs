use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid upstream address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Parse an origin base URL, requiring an absolute http(s) URL with a host
pub fn parse_origin(address: &str) -> Result<Url, UpstreamError> {
    let invalid = |reason: String| UpstreamError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let url = Url::parse(address).map_err(|e| invalid(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    Ok(url)
}
