//! Synthetic side-scan data.
//!
//! Every sample is a pure function of (source, ping, sample index, config),
//! so renders are reproducible across runs and threads.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use waterfall_common::{
    AmplitudeAccessor, DepthAccessor, SchedulerError, SchedulerResult, SourceFactory, SourceId,
};

/// Shape of the generated dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Number of channels; source ids `0..channels` are valid.
    pub channels: u16,
    pub ping_count: u64,
    pub samples_per_ping: usize,
    /// Slant-range spacing between samples (m).
    pub sample_spacing_m: f64,
    /// Mean altitude above the seabed (m).
    pub altitude_m: f64,
    /// Linear gain applied to every sample.
    pub gain: f32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            ping_count: 100_000,
            samples_per_ping: 2048,
            sample_spacing_m: 0.05,
            altitude_m: 20.0,
            gain: 1.0,
        }
    }
}

/// Source factory over synthetic data.
///
/// Reconfiguring it changes [`SourceFactory::token`], which is how the
/// scheduler notices that previously opened accessors are out of date.
pub struct SyntheticSourceFactory {
    config: RwLock<Arc<SyntheticConfig>>,
    revision: RwLock<u64>,
}

impl SyntheticSourceFactory {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            revision: RwLock::new(0),
        }
    }

    pub fn config(&self) -> Arc<SyntheticConfig> {
        self.config.read().clone()
    }

    /// Replace the configuration. Accessors opened earlier keep the old one.
    pub fn reconfigure(&self, config: SyntheticConfig) {
        *self.config.write() = Arc::new(config);
        *self.revision.write() += 1;
    }
}

impl Default for SyntheticSourceFactory {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

impl SourceFactory for SyntheticSourceFactory {
    fn amplitude_accessor(&self, source: SourceId) -> SchedulerResult<Arc<dyn AmplitudeAccessor>> {
        let config = self.config();
        if source.0 >= config.channels {
            return Err(SchedulerError::SourceUnavailable(format!(
                "{} not present ({} channels)",
                source, config.channels
            )));
        }
        Ok(Arc::new(SyntheticAmplitude { source, config }))
    }

    fn depth_accessor(&self) -> SchedulerResult<Arc<dyn DepthAccessor>> {
        Ok(Arc::new(SyntheticDepth {
            config: self.config(),
        }))
    }

    fn token(&self) -> String {
        format!("synthetic:{}", *self.revision.read())
    }
}

struct SyntheticAmplitude {
    source: SourceId,
    config: Arc<SyntheticConfig>,
}

impl AmplitudeAccessor for SyntheticAmplitude {
    fn source(&self) -> SourceId {
        self.source
    }

    fn ping_count(&self) -> u64 {
        self.config.ping_count
    }

    fn samples_per_ping(&self) -> usize {
        self.config.samples_per_ping
    }

    fn sample_spacing_m(&self) -> f64 {
        self.config.sample_spacing_m
    }

    fn read_ping(&self, ping: u64, out: &mut Vec<f32>) -> bool {
        if ping >= self.config.ping_count {
            return false;
        }
        let altitude = altitude_at(&self.config, ping);
        let phase = self.source.0 as f64 * 1.7;
        out.clear();
        out.extend((0..self.config.samples_per_ping).map(|i| {
            let range = i as f64 * self.config.sample_spacing_m;
            if range < altitude {
                // Water column: faint volume backscatter
                return 0.02 * noise(self.source.0, ping, i);
            }
            let texture = 0.5 + 0.5 * ((ping as f64 * 0.05 + phase).sin() * (i as f64 * 0.013).cos());
            let spreading = (-(range - altitude) / 200.0).exp();
            let value = texture * spreading + 0.1 * noise(self.source.0, ping, i) as f64;
            value as f32 * self.config.gain
        }));
        true
    }
}

struct SyntheticDepth {
    config: Arc<SyntheticConfig>,
}

impl DepthAccessor for SyntheticDepth {
    fn depth_at(&self, ping: u64) -> Option<f64> {
        (ping < self.config.ping_count).then(|| altitude_at(&self.config, ping))
    }
}

fn altitude_at(config: &SyntheticConfig, ping: u64) -> f64 {
    config.altitude_m + 0.25 * config.altitude_m * (ping as f64 / 200.0).sin()
}

/// Hash-based noise in [0, 1).
fn noise(source: u16, ping: u64, sample: usize) -> f32 {
    let mut x = ping
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(sample as u64)
        .wrapping_add((source as u64) << 48);
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    (x >> 40) as f32 / (1u64 << 24) as f32
}
