//! Benchmark scenario configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use renderer::{SyntheticConfig, WaterfallRendererConfig};
use tile_scheduler::SchedulerConfig;
use waterfall_common::{SourceId, TileBounds, TileFlags, TileRequest};

/// Scenario loaded from YAML. Every section is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub name: String,
    pub scheduler: SchedulerConfig,
    pub source: SyntheticConfig,
    pub renderer: WaterfallRendererConfig,
    pub view: ViewConfig,
    /// Tile cache budget; 0 disables the cache.
    pub cache_mb: usize,
    /// Calibration changes applied during the run.
    pub velocity_changes: Vec<VelocityChange>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            name: "scroll".to_string(),
            scheduler: SchedulerConfig::from_env(),
            source: SyntheticConfig::default(),
            renderer: WaterfallRendererConfig::default(),
            view: ViewConfig::default(),
            cache_mb: 256,
            velocity_changes: Vec::new(),
        }
    }
}

/// Shape and motion of the simulated viewport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Tiles stacked along-track per channel.
    pub tiles_per_channel: usize,
    pub tile_pings: i64,
    /// Across-track extent of one side (m).
    pub range_m: f64,
    pub scale: f64,
    pub density: f64,
    pub upsample: u32,
    pub ground_range: bool,
    /// Pings the view advances per step.
    pub scroll_pings: i64,
    pub step_ms: u64,
    pub steps: u64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            tiles_per_channel: 6,
            tile_pings: 128,
            range_m: 50.0,
            scale: 1.0,
            density: 4.0,
            upsample: 1,
            ground_range: true,
            scroll_pings: 40,
            step_ms: 50,
            steps: 200,
        }
    }
}

impl ViewConfig {
    /// Tiles covering the view whose top edge is at `top_ping`.
    ///
    /// Channel 0 is port (negative across-track, mirrored), channel 1
    /// starboard. Tiles are aligned to `tile_pings` so that scrolling
    /// produces the same requests for tiles that stay in view.
    pub fn tiles(&self, top_ping: i64) -> Vec<TileRequest> {
        let first = top_ping.div_euclid(self.tile_pings) * self.tile_pings;
        let range_mm = (self.range_m * 1000.0).round() as i64;
        let base = if self.ground_range {
            TileFlags::GROUND_RANGE
        } else {
            TileFlags::empty()
        };

        let mut out = Vec::with_capacity(self.tiles_per_channel * 2);
        for i in 0..self.tiles_per_channel as i64 {
            let start = first + i * self.tile_pings;
            let end = start + self.tile_pings;
            let port = TileRequest::new(
                TileBounds::new(start, end, -range_mm, 0),
                self.scale,
                self.density,
                SourceId(0),
            )
            .with_flags(base | TileFlags::MIRROR)
            .with_upsample(self.upsample);
            let starboard = TileRequest::new(
                TileBounds::new(start, end, 0, range_mm),
                self.scale,
                self.density,
                SourceId(1),
            )
            .with_flags(base)
            .with_upsample(self.upsample);
            out.push(port);
            out.push(starboard);
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityChange {
    pub at_step: u64,
    pub velocity: f64,
}

impl BenchConfig {
    /// Load configuration from YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BenchConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.scheduler.validate()?;
        if self.view.tile_pings <= 0 {
            anyhow::bail!("view.tile_pings must be > 0");
        }
        if self.view.tiles_per_channel == 0 {
            anyhow::bail!("view.tiles_per_channel must be > 0");
        }
        if self.view.range_m <= 0.0 || self.view.density <= 0.0 || self.view.scale <= 0.0 {
            anyhow::bail!("view range, density and scale must be > 0");
        }
        if self.source.channels < 2 {
            anyhow::bail!("source.channels must be >= 2 (port and starboard)");
        }
        for change in &self.velocity_changes {
            if !change.velocity.is_finite() {
                anyhow::bail!("velocity change at step {} is not finite", change.at_step);
            }
        }
        Ok(())
    }
}
