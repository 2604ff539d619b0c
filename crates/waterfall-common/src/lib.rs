//! Common types shared across the waterfall tile workspace.
//!
//! Tile requests, image buffers, calibration parameters and the capability
//! traits (renderer, source factory, data accessors) that the scheduler
//! consumes without knowing how they are implemented.

pub mod bounds;
pub mod calibration;
pub mod capability;
pub mod error;
pub mod image;
pub mod request;

pub use bounds::TileBounds;
pub use calibration::{Calibration, ProfilePoint, PropagationProfile, StateHash};
pub use capability::{
    AmplitudeAccessor, CancelFlag, DepthAccessor, RenderAccessors, Renderer, SourceFactory,
};
pub use error::{SchedulerError, SchedulerResult};
pub use image::{ImageBuffer, RenderedTile, TileDescriptor};
pub use request::{SourceId, TileFlags, TileKey, TileRequest};
