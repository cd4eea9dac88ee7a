//! Round-robin load balancing strategy

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::strategy::{BalancerError, LoadBalancer};
use crate::config::AllDownPolicy;
use crate::upstream::Upstream;

/// Round-robin load balancer that skips non-live upstreams
///
/// Each call returns the first live upstream at or after the cursor and
/// leaves the cursor one past it, so consecutive calls walk the pool in order
/// and wrap at the end. Every skipped candidate also advances the cursor.
pub struct RoundRobinBalancer {
    upstreams: Vec<Arc<dyn Upstream>>,
    cursor: Mutex<usize>,
    when_all_down: AllDownPolicy,
}

impl RoundRobinBalancer {
    pub fn new(upstreams: Vec<Arc<dyn Upstream>>) -> Result<Self, BalancerError> {
        Self::with_policy(upstreams, AllDownPolicy::default())
    }

    pub fn with_policy(
        upstreams: Vec<Arc<dyn Upstream>>,
        when_all_down: AllDownPolicy,
    ) -> Result<Self, BalancerError> {
        if upstreams.is_empty() {
            return Err(BalancerError::EmptyPool);
        }
        Ok(Self {
            upstreams,
            cursor: Mutex::new(0),
            when_all_down,
        })
    }

    /// Current cursor position (total candidates visited so far)
    pub fn cursor(&self) -> usize {
        *self.lock_cursor()
    }

    // The cursor is a plain integer, so a panic elsewhere cannot leave it
    // half-updated; recover the guard instead of propagating the poison.
    fn lock_cursor(&self) -> MutexGuard<'_, usize> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LoadBalancer for RoundRobinBalancer {
    fn select(&self) -> Result<Arc<dyn Upstream>, BalancerError> {
        let len = self.upstreams.len();
        let mut cursor = self.lock_cursor();
        let mut probed = 0;

        loop {
            let candidate = &self.upstreams[*cursor % len];
            *cursor = cursor.wrapping_add(1);

            if candidate.is_live() {
                return Ok(candidate.clone());
            }

            probed += 1;
            if probed == len {
                match self.when_all_down {
                    AllDownPolicy::Fail => {
                        tracing::warn!(pool_size = len, "No live upstream in pool");
                        return Err(BalancerError::NoLiveUpstream { probed });
                    }
                    AllDownPolicy::Spin => {
                        tracing::warn!(
                            pool_size = len,
                            "Every upstream is down, waiting for one to become live"
                        );
                    }
                }
            }
            if probed >= len {
                std::hint::spin_loop();
            }
        }
    }

    fn strategy_name(&self) -> &'static str {
        "round_robin"
    }

    fn all_upstreams(&self) -> Vec<Arc<dyn Upstream>> {
        self.upstreams.clone()
    }

    fn may_block(&self) -> bool {
        self.when_all_down == AllDownPolicy::Spin
    }
}
