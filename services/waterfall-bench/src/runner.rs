//! Scroll simulation.

use hdrhistogram::Histogram;
use metrics::{counter, histogram};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use renderer::{SyntheticSourceFactory, WaterfallRenderer};
use storage::{MemoryTileStore, TileStore};
use tile_scheduler::{SchedulerEvent, SchedulerListener, TileScheduler, TracingListener};
use waterfall_common::{Renderer, TileKey};

use crate::config::BenchConfig;

/// Longest the run waits for the queue to drain after the last step.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Aggregated results of one run.
#[derive(Debug, Clone, Serialize)]
pub struct BenchResults {
    pub name: String,
    pub duration_secs: f64,
    pub steps: u64,
    pub max_generators: usize,
    pub tiles_created: u64,
    pub tiles_ready: u64,
    pub tiles_rendered: u64,
    pub cache_hits: u64,
    pub cancellations: u64,
    pub config_failures: u64,
    pub barrier_stalls: u64,
    pub states_applied: u64,
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p99_ms: f64,
    pub latency_max_ms: f64,
    pub tiles_per_second: f64,
    pub store_hit_rate: f64,
    pub store_entries: usize,
    pub drained: bool,
}

/// Records time from first request to tile-ready, per tile.
struct LatencyListener {
    requested: Mutex<HashMap<TileKey, Instant>>,
    histogram: Mutex<Histogram<u64>>,
}

impl LatencyListener {
    fn new() -> anyhow::Result<Self> {
        Ok(Self {
            requested: Mutex::new(HashMap::new()),
            // 1 µs .. 60 s, 3 significant figures
            histogram: Mutex::new(
                Histogram::new_with_bounds(1, 60_000_000, 3)
                    .map_err(|e| anyhow::anyhow!("histogram bounds: {e:?}"))?,
            ),
        })
    }

    fn requested(&self, keys: impl IntoIterator<Item = TileKey>) {
        let now = Instant::now();
        let mut requested = self.requested.lock();
        for key in keys {
            requested.entry(key).or_insert(now);
        }
    }
}

impl SchedulerListener for LatencyListener {
    fn on_event(&self, event: &SchedulerEvent) {
        if let SchedulerEvent::TileReady(tile) = event {
            let key = tile.descriptor.request.key();
            if let Some(at) = self.requested.lock().remove(&key) {
                let elapsed = at.elapsed();
                histogram!("waterfall_bench_tile_latency_seconds").record(elapsed.as_secs_f64());
                let micros = elapsed.as_micros() as u64;
                self.histogram.lock().saturating_record(micros.max(1));
            }
        }
    }
}

/// Run the scenario to completion.
pub fn run(config: &BenchConfig) -> anyhow::Result<BenchResults> {
    let sources = Arc::new(SyntheticSourceFactory::new(config.source.clone()));
    let store = (config.cache_mb > 0).then(|| Arc::new(MemoryTileStore::new(config.cache_mb)));
    let renderer_config = config.renderer.clone();

    let mut scheduler = TileScheduler::start(
        config.scheduler.clone(),
        move |_| -> Box<dyn Renderer> { Box::new(WaterfallRenderer::new(renderer_config.clone())) },
        sources,
        store.clone().map(|s| s as Arc<dyn TileStore>),
    )?;

    let latency = Arc::new(LatencyListener::new()?);
    scheduler.subscribe(latency.clone());
    scheduler.subscribe(Arc::new(TracingListener));

    info!(
        name = %config.name,
        steps = config.view.steps,
        generators = config.scheduler.max_generators,
        "Starting scroll simulation"
    );

    let start = Instant::now();
    let step_interval = Duration::from_millis(config.view.step_ms);
    let mut tiles_created = 0u64;

    for step in 0..config.view.steps {
        let top = step as i64 * config.view.scroll_pings;
        let tiles = config.view.tiles(top);
        latency.requested(tiles.iter().map(|t| t.key()));

        let summary = scheduler.submit(step + 1, tiles)?;
        tiles_created += summary.created as u64;
        counter!("waterfall_bench_steps_total").increment(1);
        counter!("waterfall_bench_tiles_requested_total").increment(summary.created as u64);

        for change in config.velocity_changes.iter().filter(|c| c.at_step == step) {
            info!(step, velocity = change.velocity, "Changing platform velocity");
            scheduler.set_platform_velocity(change.velocity)?;
        }

        thread::sleep(step_interval);
    }

    let drained = wait_for_drain(&scheduler);
    if !drained {
        warn!("Queue did not drain before timeout");
    }
    let elapsed = start.elapsed().as_secs_f64();
    let stats = scheduler.stats();
    scheduler.shutdown();

    let histogram = latency.histogram.lock();
    let ms = |q: f64| histogram.value_at_quantile(q) as f64 / 1000.0;
    let tiles_ready = histogram.len();

    Ok(BenchResults {
        name: config.name.clone(),
        duration_secs: elapsed,
        steps: config.view.steps,
        max_generators: stats.max_generators,
        tiles_created,
        tiles_ready,
        tiles_rendered: stats.tiles_rendered,
        cache_hits: stats.cache_hits,
        cancellations: stats.cancellations,
        config_failures: stats.config_failures,
        barrier_stalls: stats.barrier_stalls,
        states_applied: stats.states_applied,
        latency_p50_ms: ms(0.50),
        latency_p90_ms: ms(0.90),
        latency_p99_ms: ms(0.99),
        latency_max_ms: histogram.max() as f64 / 1000.0,
        tiles_per_second: if elapsed > 0.0 {
            stats.tiles_rendered as f64 / elapsed
        } else {
            0.0
        },
        store_hit_rate: store.as_ref().map_or(0.0, |s| s.stats().hit_rate()),
        store_entries: store.as_ref().map_or(0, |s| s.len()),
        drained,
    })
}

fn wait_for_drain(scheduler: &TileScheduler) -> bool {
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while Instant::now() < deadline {
        if scheduler.stats().queued_tasks == 0 {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}
