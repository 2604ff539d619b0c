//! Capabilities the scheduler consumes but does not implement.
//!
//! A [`Renderer`] turns a tile request into pixels, a [`SourceFactory`]
//! opens the raw-data accessors a renderer reads from. Both are supplied by
//! the embedding application; the `renderer` crate has synthetic versions.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::{Calibration, RenderedTile, SchedulerResult, SourceId, TileRequest};

/// Read access to the amplitude samples of one channel.
pub trait AmplitudeAccessor: Send + Sync {
    fn source(&self) -> SourceId;

    fn ping_count(&self) -> u64;

    fn samples_per_ping(&self) -> usize;

    /// Across-track distance between consecutive samples at the nominal
    /// sound speed, in metres.
    fn sample_spacing_m(&self) -> f64;

    /// Fill `out` with the samples of `ping`. Returns false past the end of
    /// the data.
    fn read_ping(&self, ping: u64, out: &mut Vec<f32>) -> bool;
}

/// Altitude of the platform above the seabed, per ping.
pub trait DepthAccessor: Send + Sync {
    fn depth_at(&self, ping: u64) -> Option<f64>;
}

/// Produces accessors for a data source.
pub trait SourceFactory: Send + Sync {
    fn amplitude_accessor(&self, source: SourceId) -> SchedulerResult<Arc<dyn AmplitudeAccessor>>;

    fn depth_accessor(&self) -> SchedulerResult<Arc<dyn DepthAccessor>>;

    /// Version of the factory's own configuration. Changes whenever
    /// something inside the factory would alter what its accessors return.
    fn token(&self) -> String;
}

/// Accessors resolved for one render.
#[derive(Clone)]
pub struct RenderAccessors {
    pub amplitude: Arc<dyn AmplitudeAccessor>,
    pub depth: Option<Arc<dyn DepthAccessor>>,
}

/// Pixel generation for one generator slot.
///
/// A renderer is only ever driven from one thread at a time. `generate` must
/// poll `cancel` and return `None` soon after it is raised.
pub trait Renderer: Send {
    fn configure(
        &mut self,
        accessors: RenderAccessors,
        calibration: Arc<Calibration>,
    ) -> SchedulerResult<()>;

    fn generate(&mut self, request: &TileRequest, cancel: &CancelFlag) -> Option<RenderedTile>;
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    requests: AtomicU64,
}

/// Cooperative cancellation flag shared between a slot and its renderer.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<CancelInner>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the current render to stop.
    pub fn request(&self) {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Re-arm for the next render. The request counter is kept.
    pub fn reset(&self) {
        self.inner.cancelled.store(false, Ordering::Release);
    }

    /// Total number of cancellation requests over the flag's lifetime.
    pub fn request_count(&self) -> u64 {
        self.inner.requests.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());

        flag.request();
        assert!(other.is_cancelled());
        assert_eq!(other.request_count(), 1);

        other.reset();
        assert!(!flag.is_cancelled());
        assert_eq!(flag.request_count(), 1);
    }
}
