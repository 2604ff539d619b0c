//! Tests for TileBounds operations.

use waterfall_common::TileBounds;

// ============================================================================
// Extent tests
// ============================================================================

#[test]
fn test_bounds_new() {
    let b = TileBounds::new(100, 356, -25_000, 25_000);
    assert_eq!(b.ping_start, 100);
    assert_eq!(b.ping_end, 356);
    assert_eq!(b.range_start, -25_000);
    assert_eq!(b.range_end, 25_000);
}

#[test]
fn test_bounds_spans() {
    let b = TileBounds::new(100, 356, -25_000, 25_000);
    assert_eq!(b.ping_span(), 256);
    assert_eq!(b.range_span(), 50_000);
    assert!(!b.is_empty());
}

#[test]
fn test_bounds_empty() {
    assert!(TileBounds::new(10, 10, 0, 100).is_empty());
    assert!(TileBounds::new(0, 10, 100, 0).is_empty());
}

// ============================================================================
// Overlap tests
// ============================================================================

#[test]
fn test_bounds_intersects() {
    let a = TileBounds::new(0, 256, 0, 1000);
    let b = TileBounds::new(128, 384, 500, 1500);
    let c = TileBounds::new(256, 512, 0, 1000);
    assert!(a.intersects(&b));
    // Ends are exclusive: touching tiles do not overlap
    assert!(!a.intersects(&c));
}

#[test]
fn test_bounds_translated() {
    let a = TileBounds::new(0, 256, 0, 1000);
    let b = a.translated(256);
    assert_eq!(b, TileBounds::new(256, 512, 0, 1000));
}

#[test]
fn test_bounds_cache_key() {
    let a = TileBounds::new(0, 256, -10, 1000);
    assert_eq!(a.cache_key(), "0_256_-10_1000");
}
