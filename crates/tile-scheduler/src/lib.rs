//! Tile generation scheduler for scrolling sonar waterfalls.
//!
//! Callers stage tile requests and commit them under an epoch; the
//! scheduler diffs each commit against the work already in flight, runs new
//! tiles on a fixed pool of generator slots, cancels tiles that scrolled out
//! of view, and applies calibration changes only once every slot has
//! drained, so no render ever sees a half-applied parameter set.
//!
//! - [`queue`]: two-phase task queue with epoch diffing
//! - [`state`]: desired/current processing state and fingerprinting
//! - [`slot`]: generator slots and their per-slot workspace
//! - `dispatcher`: the single reconciliation loop
//! - `worker`: job execution on the worker pool
//! - [`events`]: notifications delivered to listeners

pub mod config;
mod dispatcher;
pub mod events;
pub mod queue;
pub mod scheduler;
pub mod slot;
pub mod state;
pub mod stats;
mod worker;

pub use config::SchedulerConfig;
pub use events::{ChannelListener, SchedulerEvent, SchedulerListener, TileReady, TracingListener};
pub use queue::{CommitSummary, TaskInfo, TaskStatus};
pub use scheduler::TileScheduler;
pub use slot::SlotStatus;
pub use stats::SchedulerStats;
