//! Shared harness for scheduler integration tests.

#![allow(dead_code)]

use crossbeam::channel::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

use storage::MemoryTileStore;
use test_utils::{CountingSourceFactory, RenderScript};
use tile_scheduler::{SchedulerConfig, SchedulerEvent, TileReady, TileScheduler};
use waterfall_common::{Renderer, TileKey};

pub const EVENT_WAIT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub scheduler: TileScheduler,
    pub script: Arc<RenderScript>,
    pub sources: Arc<CountingSourceFactory>,
    pub store: Arc<MemoryTileStore>,
    pub events: Receiver<SchedulerEvent>,
}

impl Harness {
    pub fn new(max_generators: usize) -> Self {
        Self::with_config(config(max_generators))
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        let script = RenderScript::new();
        let sources = CountingSourceFactory::new();
        let store = Arc::new(MemoryTileStore::new(16));
        let scheduler = TileScheduler::start(
            config,
            {
                let script = Arc::clone(&script);
                move |slot| -> Box<dyn Renderer> { Box::new(script.renderer(slot)) }
            },
            sources.clone(),
            Some(store.clone()),
        )
        .expect("scheduler starts");
        let events = scheduler.events();
        Self {
            scheduler,
            script,
            sources,
            store,
            events,
        }
    }

    /// Wait for the next event matching `pred`, skipping others.
    pub fn wait_event<T>(&self, mut pred: impl FnMut(&SchedulerEvent) -> Option<T>) -> Option<T> {
        let deadline = Instant::now() + EVENT_WAIT;
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match self.events.recv_timeout(left) {
                Ok(event) => {
                    if let Some(found) = pred(&event) {
                        return Some(found);
                    }
                }
                Err(_) => return None,
            }
        }
        None
    }

    pub fn wait_tile_ready(&self, key: TileKey) -> Option<TileReady> {
        self.wait_event(|e| match e {
            SchedulerEvent::TileReady(t) if t.descriptor.request.key() == key => Some(t.clone()),
            _ => None,
        })
    }

    /// Everything received so far, without waiting.
    pub fn drain_events(&self) -> Vec<SchedulerEvent> {
        self.events.try_iter().collect()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        // Never leave a worker parked on the gate
        self.script.set_ignore_cancel(false);
        self.script.release();
    }
}

pub fn config(max_generators: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_generators,
        wake_interval_ms: 20,
        barrier_timeout_ms: 2_000,
        barrier_poll_ms: 2,
    }
}

pub fn tile_ready_count(events: &[SchedulerEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SchedulerEvent::TileReady(_)))
        .count()
}
