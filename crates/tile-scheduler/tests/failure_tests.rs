//! Failures stay inside the job: configuration errors, panics, missing
//! sources, stalled barriers and shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{config, tile_ready_count, Harness};
use test_utils::{eventually, ground_tile, stays_false, tile, CountingSourceFactory, RenderScript};
use tile_scheduler::{SchedulerConfig, SchedulerEvent, TileScheduler};
use waterfall_common::{Renderer, SchedulerError, SourceId};

// ============================================================================
// Renderer failures
// ============================================================================

#[test]
fn test_configure_failure_drops_tile() {
    let h = Harness::new(1);
    h.script.set_fail_configure(true);

    h.scheduler.submit(1, [tile(0)]).unwrap();
    eventually!(h.scheduler.stats().config_failures == 1, "failure not counted");
    eventually!(h.scheduler.snapshot().is_empty(), "failed task not dropped");

    // No retry, no image, no cache entry
    assert_eq!(h.script.started_count(), 0);
    assert_eq!(tile_ready_count(&h.drain_events()), 0);
    assert!(h.store.is_empty());

    h.script.set_fail_configure(false);
    h.scheduler.submit(2, [tile(0)]).unwrap();
    assert!(h.wait_tile_ready(tile(0).key()).is_some());
}

#[test]
fn test_renderer_panic_keeps_slot() {
    let h = Harness::new(1);
    h.script.panic_next_generate();

    h.scheduler.submit(1, [tile(0)]).unwrap();
    eventually!(h.scheduler.stats().config_failures == 1, "panic not counted");
    eventually!(h.scheduler.snapshot().is_empty(), "panicked task not dropped");

    h.scheduler.submit(2, [tile(8)]).unwrap();
    let ready = h.wait_tile_ready(tile(8).key()).expect("slot still usable");
    assert_eq!(ready.slot, 0);
    assert!(h.scheduler.stats().slots_accounted());
}

#[test]
fn test_unavailable_source_waits_for_later_sweep() {
    let h = Harness::new(1);
    h.sources.set_unavailable(SourceId(5));
    let wanted = ground_tile(0, SourceId(5));

    h.scheduler.submit(1, [wanted]).unwrap();
    // Several sweeps go by and the task is still queued, not failed
    assert!(stays_false(Duration::from_millis(150), || h
        .scheduler
        .snapshot()
        .is_empty()));
    let snap = h.scheduler.snapshot();
    assert_eq!(snap.len(), 1);
    assert_eq!(snap[0].request, wanted);
    assert_eq!(h.scheduler.stats().config_failures, 0);
    assert_eq!(h.script.started_count(), 0);

    // Other sources are unaffected while it waits
    h.scheduler.submit(1, [wanted, ground_tile(8, SourceId(1))]).unwrap();
    assert!(h
        .wait_tile_ready(ground_tile(8, SourceId(1)).key())
        .is_some());

    h.sources.clear_unavailable(SourceId(5));
    let ready = h.wait_tile_ready(wanted.key()).expect("waiting tile rendered");
    assert!(!ready.from_cache);
    eventually!(h.scheduler.snapshot().is_empty(), "task never retired");
    assert!(h.scheduler.stats().slots_accounted());
}

#[test]
fn test_unavailable_source_dropped_once_stale() {
    let h = Harness::new(1);
    h.sources.set_unavailable(SourceId(5));

    h.scheduler.submit(1, [ground_tile(0, SourceId(5))]).unwrap();
    eventually!(h.scheduler.snapshot().len() == 1, "task never queued");
    h.scheduler.submit(2, [tile(8)]).unwrap();

    h.wait_tile_ready(tile(8).key()).unwrap();
    eventually!(h.scheduler.snapshot().is_empty(), "stale task kept");
    assert_eq!(h.script.started_count(), 1);
}

// ============================================================================
// Barrier stall
// ============================================================================

#[test]
fn test_stalled_barrier_reports_and_retries() {
    let h = Harness::with_config(SchedulerConfig {
        barrier_timeout_ms: 40,
        barrier_poll_ms: 5,
        ..config(2)
    });
    h.script.hold();
    h.script.set_ignore_cancel(true);

    h.scheduler.submit(1, [tile(0)]).unwrap();
    eventually!(h.script.in_flight() == 1, "render never started");
    let slot = h.scheduler.snapshot()[0].slot.unwrap();
    let before = h.scheduler.current_fingerprint();

    h.scheduler.set_platform_velocity(2.0).unwrap();
    let stuck = h
        .wait_event(|e| match e {
            SchedulerEvent::BarrierStalled { busy_slots, waited } => {
                Some((busy_slots.clone(), *waited))
            }
            _ => None,
        })
        .expect("barrier stalled");
    assert_eq!(stuck.0, vec![slot]);
    assert!(stuck.1 >= Duration::from_millis(40));
    assert_eq!(h.scheduler.current_fingerprint(), before);
    assert!(h.scheduler.stats().barrier_stalls >= 1);

    h.script.release();
    let applied = h
        .wait_event(|e| match e {
            SchedulerEvent::StateApplied { fingerprint } => Some(*fingerprint),
            _ => None,
        })
        .expect("state applied after release");
    assert_eq!(applied, h.scheduler.desired_fingerprint());
    assert_eq!(h.scheduler.current_fingerprint(), applied);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_invalid_config_rejected() {
    let script = RenderScript::new();
    let result = TileScheduler::start(
        SchedulerConfig {
            max_generators: 0,
            ..config(1)
        },
        move |slot| -> Box<dyn Renderer> { Box::new(script.renderer(slot)) },
        CountingSourceFactory::new(),
        None,
    );
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}

#[test]
fn test_shutdown_cancels_running_renders() {
    let mut h = Harness::new(2);
    h.script.hold();
    h.scheduler.submit(1, [tile(0), tile(8)]).unwrap();
    eventually!(h.script.in_flight() == 2, "slots never filled");

    h.scheduler.shutdown();
    assert_eq!(h.script.in_flight(), 0);
    assert_eq!(h.script.cancelled_count(), 2);

    assert!(matches!(
        h.scheduler.commit(2),
        Err(SchedulerError::ShutDown)
    ));
    assert!(matches!(
        h.scheduler.set_platform_velocity(1.0),
        Err(SchedulerError::ShutDown)
    ));
    // Idempotent
    h.scheduler.shutdown();
}

#[test]
fn test_runs_without_cache() {
    let script = RenderScript::new();
    let scheduler = TileScheduler::start(
        config(1),
        {
            let script = Arc::clone(&script);
            move |slot| -> Box<dyn Renderer> { Box::new(script.renderer(slot)) }
        },
        CountingSourceFactory::new(),
        None,
    )
    .unwrap();
    let events = scheduler.events();

    scheduler.submit(1, [tile(0)]).unwrap();
    let got = std::iter::from_fn(|| events.recv_timeout(Duration::from_secs(5)).ok())
        .find(|e| matches!(e, SchedulerEvent::TileReady(_)));
    assert!(got.is_some());
}
