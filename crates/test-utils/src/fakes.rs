//! Scripted capabilities for driving the scheduler deterministically.
//!
//! [`RenderScript`] is shared by every [`ScriptedRenderer`] a test creates.
//! It can hold renders open, make `configure` fail or `generate` panic, and
//! records an ordered log of everything the renderers did.

use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use waterfall_common::{
    AmplitudeAccessor, Calibration, CancelFlag, DepthAccessor, ImageBuffer, RenderAccessors,
    RenderedTile, Renderer, SchedulerError, SchedulerResult, SourceFactory, SourceId, StateHash,
    TileKey, TileRequest,
};

/// One entry of the render log.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    Configured {
        slot: usize,
        velocity: f64,
        fingerprint: StateHash,
    },
    Started {
        slot: usize,
        key: TileKey,
        velocity: f64,
        fingerprint: StateHash,
    },
    Finished {
        slot: usize,
        key: TileKey,
        cancelled: bool,
    },
}

/// Shared control and observation point for scripted renderers.
#[derive(Default)]
pub struct RenderScript {
    held: Mutex<bool>,
    released: Condvar,
    fail_configure: AtomicBool,
    ignore_cancel: AtomicBool,
    panic_next: AtomicBool,
    log: Mutex<Vec<RenderEvent>>,
    active: Mutex<HashSet<TileKey>>,
    overlap: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    flags: Mutex<HashMap<usize, CancelFlag>>,
}

impl RenderScript {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make subsequent renders block until [`release`](Self::release) or
    /// cancellation.
    pub fn hold(&self) {
        *self.held.lock() = true;
    }

    pub fn release(&self) {
        *self.held.lock() = false;
        self.released.notify_all();
    }

    pub fn set_fail_configure(&self, fail: bool) {
        self.fail_configure.store(fail, Ordering::SeqCst);
    }

    /// Keep holding renders even after their cancel flag is raised.
    pub fn set_ignore_cancel(&self, ignore: bool) {
        self.ignore_cancel.store(ignore, Ordering::SeqCst);
    }

    /// The next `generate` call panics.
    pub fn panic_next_generate(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.log.lock().clone()
    }

    /// `(slot, key, velocity)` of every render that started, in order.
    pub fn started(&self) -> Vec<(usize, TileKey, f64)> {
        self.log
            .lock()
            .iter()
            .filter_map(|e| match e {
                RenderEvent::Started {
                    slot, key, velocity, ..
                } => Some((*slot, *key, *velocity)),
                _ => None,
            })
            .collect()
    }

    pub fn started_count(&self) -> usize {
        self.started().len()
    }

    pub fn completed_count(&self) -> usize {
        self.count_finished(false)
    }

    /// Renders that observed their cancel flag and returned `None`.
    pub fn cancelled_count(&self) -> usize {
        self.count_finished(true)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// True if two renders of the same tile ever ran at the same time.
    pub fn saw_overlapping_renders(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }

    /// Lifetime cancellation requests seen by `slot`'s cancel flag.
    pub fn cancel_requests(&self, slot: usize) -> u64 {
        self.flags
            .lock()
            .get(&slot)
            .map_or(0, |f| f.request_count())
    }

    pub fn renderer(self: &Arc<Self>, slot: usize) -> ScriptedRenderer {
        ScriptedRenderer {
            slot,
            script: Arc::clone(self),
            calibration: None,
        }
    }

    fn count_finished(&self, cancelled: bool) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|e| matches!(e, RenderEvent::Finished { cancelled: c, .. } if *c == cancelled))
            .count()
    }

    fn record(&self, event: RenderEvent) {
        self.log.lock().push(event);
    }

    /// Block while held. Returns false if cancelled while waiting.
    fn wait_released(&self, cancel: &CancelFlag) -> bool {
        let mut held = self.held.lock();
        while *held {
            if cancel.is_cancelled() && !self.ignore_cancel.load(Ordering::SeqCst) {
                return false;
            }
            self.released.wait_for(&mut held, Duration::from_millis(2));
        }
        self.ignore_cancel.load(Ordering::SeqCst) || !cancel.is_cancelled()
    }
}

/// Renderer driven by a [`RenderScript`].
///
/// Pixels are filled with the configured platform velocity so tests can
/// tell which calibration produced a tile.
pub struct ScriptedRenderer {
    slot: usize,
    script: Arc<RenderScript>,
    calibration: Option<Arc<Calibration>>,
}

impl Renderer for ScriptedRenderer {
    fn configure(
        &mut self,
        _accessors: RenderAccessors,
        calibration: Arc<Calibration>,
    ) -> SchedulerResult<()> {
        if self.script.fail_configure.load(Ordering::SeqCst) {
            self.calibration = None;
            return Err(SchedulerError::RendererConfiguration(
                "scripted failure".to_string(),
            ));
        }
        self.script.record(RenderEvent::Configured {
            slot: self.slot,
            velocity: calibration.platform_velocity,
            fingerprint: calibration.fingerprint,
        });
        self.calibration = Some(calibration);
        Ok(())
    }

    fn generate(&mut self, request: &TileRequest, cancel: &CancelFlag) -> Option<RenderedTile> {
        let calibration = self.calibration.clone()?;
        let key = request.key();
        let script = &self.script;
        script.flags.lock().insert(self.slot, cancel.clone());

        if !script.active.lock().insert(key) {
            script.overlap.store(true, Ordering::SeqCst);
        }
        let now = script.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        script.max_in_flight.fetch_max(now, Ordering::SeqCst);
        script.record(RenderEvent::Started {
            slot: self.slot,
            key,
            velocity: calibration.platform_velocity,
            fingerprint: calibration.fingerprint,
        });

        let finish = |cancelled: bool| {
            script.active.lock().remove(&key);
            script.in_flight.fetch_sub(1, Ordering::SeqCst);
            script.record(RenderEvent::Finished {
                slot: self.slot,
                key,
                cancelled,
            });
        };

        if script.panic_next.swap(false, Ordering::SeqCst) {
            finish(true);
            panic!("scripted renderer panic");
        }

        if !script.wait_released(cancel) {
            finish(true);
            return None;
        }

        let (w, h) = (request.output_width(), request.output_height());
        let mut image = ImageBuffer::new(w, h);
        image.data.fill(calibration.platform_velocity as f32);
        finish(false);
        Some(RenderedTile::new(*request, image))
    }
}

/// Amplitude accessor returning a constant per source.
pub struct FixedAmplitude {
    pub source: SourceId,
    pub samples: usize,
}

impl AmplitudeAccessor for FixedAmplitude {
    fn source(&self) -> SourceId {
        self.source
    }

    fn ping_count(&self) -> u64 {
        u64::MAX
    }

    fn samples_per_ping(&self) -> usize {
        self.samples
    }

    fn sample_spacing_m(&self) -> f64 {
        0.1
    }

    fn read_ping(&self, _ping: u64, out: &mut Vec<f32>) -> bool {
        out.clear();
        out.resize(self.samples, self.source.0 as f32);
        true
    }
}

/// Depth accessor with a flat seabed.
pub struct FixedDepth(pub f64);

impl DepthAccessor for FixedDepth {
    fn depth_at(&self, _ping: u64) -> Option<f64> {
        Some(self.0)
    }
}

/// Source factory that counts how often each accessor is opened.
#[derive(Default)]
pub struct CountingSourceFactory {
    amplitude_opens: Mutex<HashMap<SourceId, usize>>,
    depth_opens: AtomicUsize,
    unavailable: Mutex<HashSet<SourceId>>,
    token: Mutex<String>,
}

impl CountingSourceFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            token: Mutex::new("fake:0".to_string()),
            ..Default::default()
        })
    }

    pub fn amplitude_opens(&self, source: SourceId) -> usize {
        self.amplitude_opens
            .lock()
            .get(&source)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_amplitude_opens(&self) -> usize {
        self.amplitude_opens.lock().values().sum()
    }

    pub fn depth_opens(&self) -> usize {
        self.depth_opens.load(Ordering::SeqCst)
    }

    /// Make `source` fail to open.
    pub fn set_unavailable(&self, source: SourceId) {
        self.unavailable.lock().insert(source);
    }

    pub fn clear_unavailable(&self, source: SourceId) {
        self.unavailable.lock().remove(&source);
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.lock() = token.into();
    }
}

impl SourceFactory for CountingSourceFactory {
    fn amplitude_accessor(&self, source: SourceId) -> SchedulerResult<Arc<dyn AmplitudeAccessor>> {
        if self.unavailable.lock().contains(&source) {
            return Err(SchedulerError::SourceUnavailable(source.to_string()));
        }
        *self.amplitude_opens.lock().entry(source).or_insert(0) += 1;
        Ok(Arc::new(FixedAmplitude {
            source,
            samples: 64,
        }))
    }

    fn depth_accessor(&self) -> SchedulerResult<Arc<dyn DepthAccessor>> {
        self.depth_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FixedDepth(10.0)))
    }

    fn token(&self) -> String {
        self.token.lock().clone()
    }
}
