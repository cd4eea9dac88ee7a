//! Scenario registry

pub mod helpers;

use crate::runner::Scenario;

/// Every scenario, in run order. Rotation runs first while the pool is fresh.
pub fn all_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("rotation/cycles_in_pool_order", rotation::test_cycles_in_pool_order),
        Scenario::new("rotation/concurrent_spread", rotation::test_concurrent_spread),
        Scenario::new("passthrough/echo_body_and_headers", passthrough::test_echo_body_and_headers),
        Scenario::new("passthrough/path_and_query", passthrough::test_path_and_query),
        Scenario::new("passthrough/forwarded_for", passthrough::test_forwarded_for),
        Scenario::new("passthrough/error_status_relayed", passthrough::test_error_status_relayed),
    ]
}
