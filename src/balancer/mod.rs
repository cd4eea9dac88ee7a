//! Upstream selection

mod round_robin;
mod strategy;

pub use round_robin::RoundRobinBalancer;
pub use strategy::{BalancerError, LoadBalancer};

use std::sync::Arc;

use crate::config::AllDownPolicy;
use crate::upstream::Upstream;

/// Build the rotation selector for a pool of upstreams
pub fn build_balancer(
    upstreams: Vec<Arc<dyn Upstream>>,
    when_all_down: AllDownPolicy,
) -> Result<Arc<dyn LoadBalancer>, BalancerError> {
    Ok(Arc::new(RoundRobinBalancer::with_policy(
        upstreams,
        when_all_down,
    )?))
}
