//! Tests for the synthetic source and the waterfall renderer.

use std::sync::Arc;

use renderer::{SyntheticConfig, SyntheticSourceFactory, WaterfallRenderer};
use test_utils::assert_approx_eq;
use waterfall_common::{
    Calibration, CancelFlag, PropagationProfile, RenderAccessors, Renderer, SourceFactory,
    SourceId, TileBounds, TileFlags, TileRequest,
};

fn configured(factory: &SyntheticSourceFactory, calibration: Calibration) -> WaterfallRenderer {
    let accessors = RenderAccessors {
        amplitude: factory.amplitude_accessor(SourceId(0)).unwrap(),
        depth: Some(factory.depth_accessor().unwrap()),
    };
    let mut renderer = WaterfallRenderer::default();
    renderer
        .configure(accessors, Arc::new(calibration))
        .unwrap();
    renderer
}

fn request(flags: TileFlags) -> TileRequest {
    // 16 pings, 0..32 m across-track at 2 px/m
    TileRequest::new(TileBounds::new(100, 116, 0, 32_000), 1.0, 2.0, SourceId(0)).with_flags(flags)
}

// ============================================================================
// Output geometry
// ============================================================================

#[test]
fn test_output_dimensions() {
    let factory = SyntheticSourceFactory::default();
    let mut renderer = configured(&factory, Calibration::default());

    let tile = renderer
        .generate(&request(TileFlags::empty()), &CancelFlag::new())
        .unwrap();
    assert_eq!(tile.descriptor.width, 64);
    assert_eq!(tile.descriptor.height, 16);
    assert_eq!(tile.image.data.len(), 64 * 16);
}

#[test]
fn test_empty_bounds_give_empty_tile() {
    let factory = SyntheticSourceFactory::default();
    let mut renderer = configured(&factory, Calibration::default());

    let req = TileRequest::new(TileBounds::new(5, 5, 0, 1000), 1.0, 1.0, SourceId(0));
    let tile = renderer.generate(&req, &CancelFlag::new()).unwrap();
    assert_eq!(tile.image.data.len(), 0);
}

#[test]
fn test_render_is_deterministic() {
    let factory = SyntheticSourceFactory::default();
    let mut a = configured(&factory, Calibration::default());
    let mut b = configured(&factory, Calibration::default());

    let req = request(TileFlags::GROUND_RANGE);
    let ta = a.generate(&req, &CancelFlag::new()).unwrap();
    let tb = b.generate(&req, &CancelFlag::new()).unwrap();
    assert_eq!(ta.image.data, tb.image.data);
}

// ============================================================================
// Flags
// ============================================================================

#[test]
fn test_mirror_reverses_rows() {
    let factory = SyntheticSourceFactory::default();
    let mut renderer = configured(&factory, Calibration::default());

    let plain = renderer
        .generate(&request(TileFlags::empty()), &CancelFlag::new())
        .unwrap();
    let mirrored = renderer
        .generate(&request(TileFlags::MIRROR), &CancelFlag::new())
        .unwrap();

    for y in 0..plain.image.height {
        let mut row = plain.image.row(y).to_vec();
        row.reverse();
        assert_eq!(row.as_slice(), mirrored.image.row(y));
    }
}

#[test]
fn test_ground_range_removes_water_column() {
    let factory = SyntheticSourceFactory::new(SyntheticConfig {
        altitude_m: 20.0,
        ..Default::default()
    });
    let mut renderer = configured(&factory, Calibration::default());

    let slant = renderer
        .generate(&request(TileFlags::empty()), &CancelFlag::new())
        .unwrap();
    let ground = renderer
        .generate(&request(TileFlags::GROUND_RANGE), &CancelFlag::new())
        .unwrap();

    // 5 m across-track is inside the water column in slant range, but on
    // the seabed once corrected to ground range.
    let slant_near: f32 = (0..16).map(|y| slant.image.row(y)[10]).sum();
    let ground_near: f32 = (0..16).map(|y| ground.image.row(y)[10]).sum();
    assert!(slant_near < 0.5);
    assert!(ground_near > slant_near);
}

#[test]
fn test_profile_changes_ground_range_output() {
    let factory = SyntheticSourceFactory::default();
    let mut fast = configured(&factory, Calibration::default());
    let mut slow = configured(
        &factory,
        Calibration {
            profile: PropagationProfile::uniform(1400.0),
            ..Default::default()
        },
    );

    let req = request(TileFlags::GROUND_RANGE);
    let a = fast.generate(&req, &CancelFlag::new()).unwrap();
    let b = slow.generate(&req, &CancelFlag::new()).unwrap();
    assert_ne!(a.image.data, b.image.data);
}

#[test]
fn test_upsample_interpolates() {
    let factory = SyntheticSourceFactory::default();
    let mut renderer = configured(&factory, Calibration::default());

    let nearest = renderer
        .generate(&request(TileFlags::empty()), &CancelFlag::new())
        .unwrap();
    let smooth = renderer
        .generate(
            &request(TileFlags::empty()).with_upsample(4),
            &CancelFlag::new(),
        )
        .unwrap();

    assert_eq!(nearest.image.data.len(), smooth.image.data.len());
    let mean_a: f32 = nearest.image.data.iter().sum::<f32>() / nearest.image.data.len() as f32;
    let mean_b: f32 = smooth.image.data.iter().sum::<f32>() / smooth.image.data.len() as f32;
    assert_approx_eq!(mean_a as f64, mean_b as f64, 0.1);
}

// ============================================================================
// Calibration and cancellation
// ============================================================================

#[test]
fn test_velocity_shifts_pings() {
    let factory = SyntheticSourceFactory::default();
    let mut still = configured(&factory, Calibration::default());
    let mut moving = configured(
        &factory,
        Calibration {
            platform_velocity: 2.0,
            ..Default::default()
        },
    );

    let req = request(TileFlags::empty());
    let a = still.generate(&req, &CancelFlag::new()).unwrap();
    let b = moving.generate(&req, &CancelFlag::new()).unwrap();
    assert_ne!(a.image.data, b.image.data);
}

#[test]
fn test_cancelled_render_returns_none() {
    let factory = SyntheticSourceFactory::default();
    let mut renderer = configured(&factory, Calibration::default());

    let cancel = CancelFlag::new();
    cancel.request();
    assert!(renderer.generate(&request(TileFlags::empty()), &cancel).is_none());

    cancel.reset();
    assert!(renderer.generate(&request(TileFlags::empty()), &cancel).is_some());
}

#[test]
fn test_configure_rejects_empty_pings() {
    let factory = SyntheticSourceFactory::new(SyntheticConfig {
        samples_per_ping: 0,
        ..Default::default()
    });
    let accessors = RenderAccessors {
        amplitude: factory.amplitude_accessor(SourceId(0)).unwrap(),
        depth: None,
    };
    let mut renderer = WaterfallRenderer::default();
    let result = renderer.configure(accessors, Arc::new(Calibration::default()));
    assert!(result.is_err());
    assert!(renderer.calibration().is_none());
}
