//! Load balancer trait

use std::sync::Arc;

use crate::upstream::Upstream;

/// Trait for strategies that pick the upstream for each request
pub trait LoadBalancer: Send + Sync {
    /// Select the next upstream according to the strategy
    fn select(&self) -> Result<Arc<dyn Upstream>, BalancerError>;

    /// Return the strategy name (for logging)
    fn strategy_name(&self) -> &'static str;

    /// Return every upstream in pool order (for logging/CLI display)
    fn all_upstreams(&self) -> Vec<Arc<dyn Upstream>>;

    /// Whether `select` may block until an upstream becomes live. Callers on
    /// an async runtime must then run it off the worker threads.
    fn may_block(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BalancerError {
    #[error("load balancer requires at least one upstream")]
    EmptyPool,

    #[error("no live upstream available after probing {probed} candidates")]
    NoLiveUpstream { probed: usize },
}
