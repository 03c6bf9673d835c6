//! Polling helper for asserting on background work.

use std::time::Duration;

/// Polls `condition` every millisecond until it holds or `timeout` elapses.
/// Returns whether the condition was met. Works with paused tokio time.
pub async fn wait_for(condition: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
