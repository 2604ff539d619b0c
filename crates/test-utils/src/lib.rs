//! Shared test utilities for the waterfall tile workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Scripted renderer and source factory fakes with inspection hooks
//! - Tile request fixtures
//! - Polling helpers for asserting on background threads
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, RenderScript, wait_until};
//! ```

pub mod fakes;
pub mod fixtures;
pub mod wait;

// Re-export commonly used items at the crate root
pub use fakes::*;
pub use fixtures::*;
pub use wait::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Wait until a condition holds or panic with a message.
///
/// # Usage
///
/// ```ignore
/// use test_utils::eventually;
///
/// eventually!(scheduler.stats().queued_tasks == 0, "queue never drained");
/// ```
#[macro_export]
macro_rules! eventually {
    ($cond:expr, $($msg:tt)+) => {{
        if !$crate::wait_until($crate::DEFAULT_WAIT, || $cond) {
            panic!($($msg)+);
        }
    }};
}
