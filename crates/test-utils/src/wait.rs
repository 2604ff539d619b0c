//! Bounded polling for conditions that become true on other threads.

use std::thread;
use std::time::{Duration, Instant};

/// Deadline used by [`eventually!`](crate::eventually).
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

const POLL: Duration = Duration::from_millis(2);

/// Poll `cond` until it returns true or `timeout` elapses.
///
/// Returns whether the condition was met.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL);
    }
}

/// Assert that `cond` stays false for the whole of `period`.
pub fn stays_false(period: Duration, mut cond: impl FnMut() -> bool) -> bool {
    !wait_until(period, &mut cond)
}
