//! Reference renderer and data sources for sonar waterfall tiles.
//!
//! - [`synthetic`]: a deterministic source factory producing fake side-scan
//!   pings and platform altitude, for benchmarks and demos
//! - [`waterfall`]: a renderer that resamples pings into a float tile,
//!   with optional slant-to-ground correction and mirroring

pub mod synthetic;
pub mod waterfall;

pub use synthetic::{SyntheticConfig, SyntheticSourceFactory};
pub use waterfall::{WaterfallRenderer, WaterfallRendererConfig};
