//! Tile requests submitted by the view layer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TileBounds;

/// Raw-data channel a tile is rendered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u16);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src{}", self.0)
    }
}

/// Projection and orientation flags of a tile request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileFlags(u8);

impl TileFlags {
    /// Slant range is projected onto the seabed; needs a depth accessor.
    pub const GROUND_RANGE: TileFlags = TileFlags(0b01);
    /// Mirror the across-track axis (port side drawn to the left).
    pub const MIRROR: TileFlags = TileFlags(0b10);

    pub const fn empty() -> Self {
        TileFlags(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build from raw bits, ignoring unknown ones.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        TileFlags(bits & 0b11)
    }

    pub const fn contains(self, other: TileFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: TileFlags) -> Self {
        TileFlags(self.0 | other.0)
    }

    pub fn ground_range(self) -> bool {
        self.contains(Self::GROUND_RANGE)
    }

    pub fn mirrored(self) -> bool {
        self.contains(Self::MIRROR)
    }
}

impl std::ops::BitOr for TileFlags {
    type Output = TileFlags;

    fn bitor(self, rhs: TileFlags) -> TileFlags {
        self.union(rhs)
    }
}

/// One tile the view wants rendered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileRequest {
    pub bounds: TileBounds,
    /// Output rows per along-track ping.
    pub scale: f64,
    /// Output columns per metre across-track.
    pub density: f64,
    /// Integer upsampling factor applied to the raw samples.
    pub upsample: u32,
    pub flags: TileFlags,
    pub source: SourceId,
}

impl TileRequest {
    pub fn new(bounds: TileBounds, scale: f64, density: f64, source: SourceId) -> Self {
        Self {
            bounds,
            scale,
            density,
            upsample: 1,
            flags: TileFlags::empty(),
            source,
        }
    }

    pub fn with_flags(mut self, flags: TileFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_upsample(mut self, upsample: u32) -> Self {
        self.upsample = upsample;
        self
    }

    /// Identity used to deduplicate tasks.
    pub fn key(&self) -> TileKey {
        TileKey {
            bounds: self.bounds,
            scale_bits: self.scale.to_bits(),
            density_bits: self.density.to_bits(),
        }
    }

    /// Output width in pixels (across-track).
    pub fn output_width(&self) -> u32 {
        let metres = self.bounds.range_span() as f64 / 1000.0;
        (metres * self.density).round().max(0.0) as u32
    }

    /// Output height in pixels (along-track, one row per ping at scale 1).
    pub fn output_height(&self) -> u32 {
        let px = self.bounds.ping_span() as f64 * self.scale;
        px.round().max(0.0) as u32
    }
}

/// Exact-match identity of a tile: geometry, scale and density.
///
/// Floats are compared by bit pattern, so two requests are the same tile
/// only if every component is identical. Source and flags are not part of
/// the key: two sources requesting the same geometry share one task, so
/// callers keep per-source tiles apart by geometry (e.g. signed across-track
/// ranges for port and starboard).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub bounds: TileBounds,
    pub scale_bits: u64,
    pub density_bits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TileRequest {
        TileRequest::new(TileBounds::new(0, 256, 0, 50_000), 1.0, 5.12, SourceId(1))
    }

    #[test]
    fn test_key_is_exact() {
        let a = request();
        let mut b = a;
        assert_eq!(a.key(), b.key());

        b.scale = 1.0 + f64::EPSILON;
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_key_ignores_flags_and_source() {
        let a = request();
        let b = a.with_flags(TileFlags::MIRROR);
        assert_eq!(a.key(), b.key());

        let mut c = a;
        c.source = SourceId(7);
        assert_eq!(a.key(), c.key());

        let mut port = a;
        port.bounds = TileBounds::new(0, 256, -50_000, 0);
        assert_ne!(a.key(), port.key());
    }

    #[test]
    fn test_flags() {
        let flags = TileFlags::GROUND_RANGE | TileFlags::MIRROR;
        assert!(flags.ground_range());
        assert!(flags.mirrored());
        assert!(!TileFlags::empty().ground_range());
        assert_eq!(TileFlags::from_bits_truncate(0xff).bits(), 0b11);
    }

    #[test]
    fn test_output_size() {
        let req = request();
        // 50 m at 5.12 px/m
        assert_eq!(req.output_width(), 256);
        assert_eq!(req.output_height(), 256);
    }
}
