//! Scheduler statistics and metrics.

use metrics::{counter, gauge};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use waterfall_common::StateHash;

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub max_generators: usize,
    pub idle_slots: usize,
    pub busy_slots: usize,
    pub retireable_slots: usize,

    pub epoch: u64,
    pub staged: usize,
    pub queued_tasks: usize,
    pub idle_tasks: usize,
    pub running_tasks: usize,
    pub retireable_tasks: usize,

    pub tiles_rendered: u64,
    pub cache_hits: u64,
    pub cancellations: u64,
    pub config_failures: u64,
    pub barrier_stalls: u64,
    pub states_applied: u64,

    pub desired_fingerprint: StateHash,
    pub current_fingerprint: StateHash,
}

impl SchedulerStats {
    /// Every slot is in exactly one state.
    pub fn slots_accounted(&self) -> bool {
        self.idle_slots + self.busy_slots + self.retireable_slots == self.max_generators
    }
}

/// Lifetime counters, mirrored to the `metrics` facade.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    tiles_rendered: AtomicU64,
    cache_hits: AtomicU64,
    cancellations: AtomicU64,
    config_failures: AtomicU64,
    barrier_stalls: AtomicU64,
    states_applied: AtomicU64,
}

impl Counters {
    pub(crate) fn tile_rendered(&self) {
        self.tiles_rendered.fetch_add(1, Ordering::Relaxed);
        counter!("tile_scheduler_tiles_rendered_total").increment(1);
    }

    pub(crate) fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        counter!("tile_scheduler_cache_hits_total").increment(1);
    }

    pub(crate) fn cancelled(&self, n: usize) {
        if n == 0 {
            return;
        }
        self.cancellations.fetch_add(n as u64, Ordering::Relaxed);
        counter!("tile_scheduler_cancellations_total").increment(n as u64);
    }

    pub(crate) fn config_failure(&self) {
        self.config_failures.fetch_add(1, Ordering::Relaxed);
        counter!("tile_scheduler_config_failures_total").increment(1);
    }

    pub(crate) fn barrier_stall(&self) {
        self.barrier_stalls.fetch_add(1, Ordering::Relaxed);
        counter!("tile_scheduler_barrier_stalls_total").increment(1);
    }

    pub(crate) fn state_applied(&self) {
        self.states_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fill(&self, stats: &mut SchedulerStats) {
        stats.tiles_rendered = self.tiles_rendered.load(Ordering::Relaxed);
        stats.cache_hits = self.cache_hits.load(Ordering::Relaxed);
        stats.cancellations = self.cancellations.load(Ordering::Relaxed);
        stats.config_failures = self.config_failures.load(Ordering::Relaxed);
        stats.barrier_stalls = self.barrier_stalls.load(Ordering::Relaxed);
        stats.states_applied = self.states_applied.load(Ordering::Relaxed);
    }
}

pub(crate) fn record_gauges(busy_slots: usize, queued_tasks: usize) {
    gauge!("tile_scheduler_busy_slots").set(busy_slots as f64);
    gauge!("tile_scheduler_queued_tasks").set(queued_tasks as f64);
}
