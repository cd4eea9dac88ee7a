mod loader;

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use loader::load_config;

use crate::upstream::parse_origin;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Origin base URLs, in rotation order
    #[serde(default = "default_upstreams")]
    pub upstreams: Vec<String>,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_upstreams() -> Vec<String> {
    vec![
        "https://www.bing.com".to_string(),
        "https://www.facebook.com".to_string(),
        "https://www.google.com".to_string(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Settings shared by every upstream's HTTP client
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Whole-request timeout in seconds. `None` waits on the origin forever.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Rotation selector configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SelectionConfig {
    #[serde(default)]
    pub when_all_down: AllDownPolicy,
}

/// What `select()` does when every upstream in the pool is non-live
///
/// - `Fail`: give up after one full sweep of the pool and report that no
///   upstream is available (the dispatcher answers 503)
/// - `Spin`: keep probing until some upstream becomes live. The call never
///   returns while the whole pool is down and it holds the selector lock
///   for the duration. The thread running it is pinned, and every other
///   caller blocks on the lock, so the dispatcher runs selection on the
///   blocking pool; run directly on tokio workers it would stall the whole
///   runtime, accept loop included.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AllDownPolicy {
    #[default]
    Fail,
    Spin,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstreams: default_upstreams(),
            upstream: UpstreamConfig::default(),
            selection: SelectionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load_config(path)
    }

    /// Load configuration, falling back to the built-in pool when no path is
    /// given and none of the default locations exist
    pub fn load_or_default(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) => Self::from_file(path),
            None => {
                let default_paths = ["config.yaml", "config.yml", "./config/config.yaml"];
                for p in default_paths {
                    let path = Path::new(p);
                    if path.exists() {
                        return Self::from_file(path);
                    }
                }
                tracing::debug!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Check the invariants the balancer relies on at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port must be between 1 and 65535".to_string(),
            ));
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Validation("server.host is empty".to_string()));
        }
        if self.upstreams.is_empty() {
            return Err(ConfigError::Validation(
                "at least one upstream is required".to_string(),
            ));
        }
        for address in &self.upstreams {
            parse_origin(address)
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }
        if self.upstream.timeout_seconds == Some(0) {
            return Err(ConfigError::Validation(
                "upstream.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
