//! Shared types for the e2e test framework

use std::sync::{Arc, Mutex};

/// Names served by the mock origins, in the balancer's rotation order
pub const ORIGIN_NAMES: &[&str] = &["A", "B", "C"];

/// State of one mock origin
#[derive(Debug, Default)]
pub struct OriginState {
    pub name: String,
    /// Number of requests this origin has served since the last reset
    pub hits: usize,
}

pub type SharedOriginState = Arc<Mutex<OriginState>>;

/// Handles to every mock origin, in rotation order
#[derive(Debug, Clone, Default)]
pub struct Origins {
    pub states: Vec<SharedOriginState>,
}

impl Origins {
    /// Reset hit counters before each test
    pub fn reset(&self) {
        for state in &self.states {
            state.lock().unwrap().hits = 0;
        }
    }

    /// Hits per origin name, in rotation order
    pub fn hits(&self) -> Vec<(String, usize)> {
        self.states
            .iter()
            .map(|s| {
                let s = s.lock().unwrap();
                (s.name.clone(), s.hits)
            })
            .collect()
    }
}

/// Result of a request sent through the balancer
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: reqwest::header::HeaderMap,
    pub body: bytes::Bytes,
}

impl ProxyResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
