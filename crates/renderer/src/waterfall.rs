//! Waterfall renderer.
//!
//! Each output row is one ping (times `scale`), each column a fixed
//! across-track distance. Slant-range tiles index the samples directly;
//! ground-range tiles remove the water column using the platform altitude
//! and the harmonic mean sound speed of the propagation profile.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

use waterfall_common::calibration::DEFAULT_SOUND_SPEED;
use waterfall_common::{
    Calibration, CancelFlag, ImageBuffer, RenderAccessors, RenderedTile, Renderer,
    SchedulerError, SchedulerResult, TileRequest,
};

/// Static renderer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterfallRendererConfig {
    /// Ping repetition rate (Hz).
    pub ping_rate_hz: f64,
    /// Along-track offset between the platform reference point and the
    /// transducer (m). Converted to a ping shift using the platform velocity.
    pub layback_m: f64,
}

impl Default for WaterfallRendererConfig {
    fn default() -> Self {
        Self {
            ping_rate_hz: 10.0,
            layback_m: 5.0,
        }
    }
}

struct Configured {
    accessors: RenderAccessors,
    calibration: Arc<Calibration>,
    layback_pings: i64,
}

/// Reference [`Renderer`] producing single-channel float waterfalls.
pub struct WaterfallRenderer {
    config: WaterfallRendererConfig,
    state: Option<Configured>,
}

impl WaterfallRenderer {
    pub fn new(config: WaterfallRendererConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Calibration of the last successful `configure`.
    pub fn calibration(&self) -> Option<&Arc<Calibration>> {
        self.state.as_ref().map(|s| &s.calibration)
    }

    fn layback_pings(&self, velocity: f64) -> i64 {
        if velocity <= 0.0 || self.config.ping_rate_hz <= 0.0 {
            return 0;
        }
        let metres_per_ping = velocity / self.config.ping_rate_hz;
        (self.config.layback_m / metres_per_ping).round() as i64
    }
}

impl Default for WaterfallRenderer {
    fn default() -> Self {
        Self::new(WaterfallRendererConfig::default())
    }
}

impl Renderer for WaterfallRenderer {
    fn configure(
        &mut self,
        accessors: RenderAccessors,
        calibration: Arc<Calibration>,
    ) -> SchedulerResult<()> {
        if accessors.amplitude.samples_per_ping() == 0 {
            self.state = None;
            return Err(SchedulerError::RendererConfiguration(format!(
                "{} has no samples",
                accessors.amplitude.source()
            )));
        }
        let spacing = accessors.amplitude.sample_spacing_m();
        if spacing.is_nan() || spacing <= 0.0 {
            self.state = None;
            return Err(SchedulerError::RendererConfiguration(format!(
                "{} has invalid sample spacing",
                accessors.amplitude.source()
            )));
        }

        let layback_pings = self.layback_pings(calibration.platform_velocity);
        debug!(
            source = %accessors.amplitude.source(),
            fingerprint = %calibration.fingerprint,
            layback_pings,
            "Renderer configured"
        );
        self.state = Some(Configured {
            accessors,
            calibration,
            layback_pings,
        });
        Ok(())
    }

    fn generate(&mut self, request: &TileRequest, cancel: &CancelFlag) -> Option<RenderedTile> {
        let state = self.state.as_ref()?;
        let width = request.output_width() as usize;
        let height = request.output_height() as usize;

        let mut image = ImageBuffer::new(width as u32, height as u32);
        if width == 0 || height == 0 {
            return Some(RenderedTile::new(*request, image));
        }

        let amplitude = &state.accessors.amplitude;
        let depth = if request.flags.ground_range() {
            state.accessors.depth.as_ref()
        } else {
            None
        };
        let spacing = amplitude.sample_spacing_m();
        let upsample = request.upsample.max(1);
        let mirrored = request.flags.mirrored();
        let range_origin = request.bounds.range_start as f64 / 1000.0;

        image
            .data
            .par_chunks_mut(width)
            .enumerate()
            .for_each_init(Vec::new, |samples, (y, row)| {
                if cancel.is_cancelled() {
                    return;
                }
                let ping = request.bounds.ping_start + (y as f64 / request.scale).floor() as i64
                    - state.layback_pings;
                if ping < 0 || !amplitude.read_ping(ping as u64, samples) {
                    return;
                }

                // Ground-range rows need the altitude and an effective sound speed
                let ground = depth.and_then(|d| d.depth_at(ping as u64)).map(|altitude| {
                    let speed = state.calibration.profile.mean_speed(altitude);
                    (altitude, DEFAULT_SOUND_SPEED / speed)
                });

                for (x, px) in row.iter_mut().enumerate() {
                    let col = if mirrored { width - 1 - x } else { x };
                    // Port-side tiles have negative across-track bounds
                    let across = (range_origin + (col as f64 + 0.5) / request.density).abs();
                    let slant = match ground {
                        Some((altitude, correction)) => {
                            (across * across + altitude * altitude).sqrt() * correction
                        }
                        None => across,
                    };
                    *px = sample_at(samples, slant / spacing, upsample);
                }
            });

        if cancel.is_cancelled() {
            trace!(bounds = %request.bounds.cache_key(), "Render cancelled");
            return None;
        }
        Some(RenderedTile::new(*request, image))
    }
}

/// Sample at fractional index `pos`: nearest for `upsample == 1`, linear
/// interpolation otherwise. Out-of-range positions read as zero.
fn sample_at(samples: &[f32], pos: f64, upsample: u32) -> f32 {
    if pos < 0.0 || samples.is_empty() {
        return 0.0;
    }
    let last = samples.len() - 1;
    if upsample <= 1 {
        let i = pos.round() as usize;
        return if i <= last { samples[i] } else { 0.0 };
    }

    let i0 = pos.floor() as usize;
    if i0 > last {
        return 0.0;
    }
    let i1 = (i0 + 1).min(last);
    let t = (pos - i0 as f64) as f32;
    samples[i0] * (1.0 - t) + samples[i1] * t
}
