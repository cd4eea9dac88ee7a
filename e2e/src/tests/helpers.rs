//! Common assertions

/// Fail the test with `message` unless `condition` holds
pub fn assert_true(condition: bool, message: &str) -> anyhow::Result<()> {
    if condition {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{}", message))
    }
}

/// Position of an origin name in the rotation order
pub fn rotation_index(name: &str) -> anyhow::Result<usize> {
    crate::types::ORIGIN_NAMES
        .iter()
        .position(|n| *n == name)
        .ok_or_else(|| anyhow::anyhow!("Response body {:?} is not an origin name", name))
}
