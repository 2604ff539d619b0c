//! Scheduler notifications.
//!
//! Events are delivered synchronously on the thread that produced them: the
//! dispatcher for slot and barrier events, a worker for tile-ready, the
//! caller for desired-state changes. Listeners must be quick and must not
//! call back into the scheduler's setters.

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use waterfall_common::{ImageBuffer, StateHash, TileDescriptor};

/// A rendered (or cache-served) tile.
#[derive(Debug, Clone)]
pub struct TileReady {
    pub descriptor: TileDescriptor,
    pub image: Arc<ImageBuffer>,
    pub byte_len: usize,
    pub fingerprint: StateHash,
    /// Slot that produced the tile.
    pub slot: usize,
    /// Served from the cache without rendering.
    pub from_cache: bool,
}

#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// One or more slots returned to idle during a sweep.
    SlotsAvailable { reclaimed: usize },

    TileReady(TileReady),

    /// A setter changed the desired calibration.
    DesiredStateChanged { fingerprint: StateHash },

    /// Busy slots did not drain before the barrier deadline. The change stays
    /// pending and is retried on the next sweep.
    BarrierStalled {
        busy_slots: Vec<usize>,
        waited: Duration,
    },

    /// The desired calibration became current.
    StateApplied { fingerprint: StateHash },
}

/// Receives scheduler events.
pub trait SchedulerListener: Send + Sync {
    fn on_event(&self, event: &SchedulerEvent);
}

/// Forwards events into an unbounded channel.
pub struct ChannelListener {
    tx: Sender<SchedulerEvent>,
}

impl ChannelListener {
    /// Create a listener and the receiving end of its channel.
    pub fn channel() -> (Self, Receiver<SchedulerEvent>) {
        let (tx, rx) = channel::unbounded();
        (Self { tx }, rx)
    }
}

impl SchedulerListener for ChannelListener {
    fn on_event(&self, event: &SchedulerEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event.clone());
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl SchedulerListener for TracingListener {
    fn on_event(&self, event: &SchedulerEvent) {
        match event {
            SchedulerEvent::SlotsAvailable { reclaimed } => {
                debug!(reclaimed, "Slots available")
            }
            SchedulerEvent::TileReady(tile) => debug!(
                source = %tile.descriptor.request.source,
                bounds = %tile.descriptor.request.bounds.cache_key(),
                slot = tile.slot,
                bytes = tile.byte_len,
                from_cache = tile.from_cache,
                "Tile ready"
            ),
            SchedulerEvent::DesiredStateChanged { fingerprint } => {
                info!(fingerprint = %fingerprint, "Desired calibration changed")
            }
            SchedulerEvent::BarrierStalled { busy_slots, waited } => warn!(
                ?busy_slots,
                waited_ms = waited.as_millis() as u64,
                "Calibration barrier stalled"
            ),
            SchedulerEvent::StateApplied { fingerprint } => {
                info!(fingerprint = %fingerprint, "Calibration applied")
            }
        }
    }
}

/// Registered listeners.
#[derive(Default)]
pub(crate) struct Listeners {
    inner: RwLock<Vec<Arc<dyn SchedulerListener>>>,
}

impl Listeners {
    pub(crate) fn add(&self, listener: Arc<dyn SchedulerListener>) {
        self.inner.write().push(listener);
    }

    pub(crate) fn emit(&self, event: SchedulerEvent) {
        // Snapshot so a listener may subscribe another without deadlocking
        let listeners = self.inner.read().clone();
        for listener in &listeners {
            listener.on_event(&event);
        }
    }
}
