//! Tile bounds in sonar waterfall coordinates.

use serde::{Deserialize, Serialize};

/// Rectangular region of a waterfall.
///
/// The along-track axis is measured in ping indices and the across-track
/// axis in millimetres from nadir, so bounds compare exactly without any
/// floating-point tolerance. Starts are inclusive, ends exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileBounds {
    pub ping_start: i64,
    pub ping_end: i64,
    pub range_start: i64,
    pub range_end: i64,
}

impl TileBounds {
    /// Create bounds from along-track and across-track extents.
    pub fn new(ping_start: i64, ping_end: i64, range_start: i64, range_end: i64) -> Self {
        Self {
            ping_start,
            ping_end,
            range_start,
            range_end,
        }
    }

    /// Number of pings covered.
    pub fn ping_span(&self) -> i64 {
        self.ping_end - self.ping_start
    }

    /// Across-track extent in millimetres.
    pub fn range_span(&self) -> i64 {
        self.range_end - self.range_start
    }

    /// True when either extent is zero or negative.
    pub fn is_empty(&self) -> bool {
        self.ping_span() <= 0 || self.range_span() <= 0
    }

    /// Check if this region overlaps another.
    pub fn intersects(&self, other: &TileBounds) -> bool {
        self.ping_start < other.ping_end
            && self.ping_end > other.ping_start
            && self.range_start < other.range_end
            && self.range_end > other.range_start
    }

    /// Shift the region along-track by `pings`.
    pub fn translated(&self, pings: i64) -> TileBounds {
        TileBounds {
            ping_start: self.ping_start + pings,
            ping_end: self.ping_end + pings,
            ..*self
        }
    }

    /// Stable string form used inside cache keys.
    pub fn cache_key(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.ping_start, self.ping_end, self.range_start, self.range_end
        )
    }
}
