//! Common test fixtures for scheduler tests.
//!
//! Requests here are small so that renders finish in microseconds unless a
//! test holds them deliberately.

use waterfall_common::{SourceId, TileBounds, TileFlags, TileRequest};

/// Tile height in pings.
pub const TILE_PINGS: i64 = 8;

/// Tile width across-track in millimetres (4 m).
pub const TILE_RANGE_MM: i64 = 4_000;

/// A tile of the default geometry starting at `ping_start`.
pub fn tile(ping_start: i64) -> TileRequest {
    TileRequest::new(
        TileBounds::new(ping_start, ping_start + TILE_PINGS, 0, TILE_RANGE_MM),
        1.0,
        2.0,
        SourceId(0),
    )
}

/// A column of `count` adjacent tiles starting at `ping_start`.
pub fn tile_column(ping_start: i64, count: usize) -> Vec<TileRequest> {
    (0..count as i64)
        .map(|i| tile(ping_start + i * TILE_PINGS))
        .collect()
}

/// Same geometry as [`tile`], rendered as ground range on `source`.
pub fn ground_tile(ping_start: i64, source: SourceId) -> TileRequest {
    TileRequest {
        source,
        ..tile(ping_start)
    }
    .with_flags(TileFlags::GROUND_RANGE)
}
