//! End-to-end scheduling scenarios: single tile, retained tile, scrolled
//! away tile and a calibration change under load.

mod common;

use common::{tile_ready_count, Harness};
use test_utils::{eventually, tile, RenderEvent};
use tile_scheduler::{SchedulerEvent, SlotStatus, TaskStatus};

// ============================================================================
// Single tile
// ============================================================================

#[test]
fn test_single_tile_renders_and_retires() {
    let h = Harness::new(2);
    h.script.hold();

    h.scheduler.stage(tile(0));
    let summary = h.scheduler.commit(1).unwrap();
    assert_eq!(summary.created, 1);

    eventually!(h.script.in_flight() == 1, "render never started");
    let stats = h.scheduler.stats();
    assert_eq!(stats.busy_slots, 1);
    assert_eq!(stats.idle_slots, 1);
    assert_eq!(stats.running_tasks, 1);

    h.script.release();
    let ready = h.wait_tile_ready(tile(0).key()).expect("tile ready");
    assert!(!ready.from_cache);
    assert_eq!(ready.fingerprint, h.scheduler.current_fingerprint());
    assert_eq!(ready.byte_len, ready.image.byte_len());

    eventually!(h.scheduler.snapshot().is_empty(), "task never retired");
    eventually!(
        h.scheduler
            .slot_statuses()
            .iter()
            .all(|s| *s == SlotStatus::Idle),
        "slot never reclaimed"
    );
    assert_eq!(h.script.started_count(), 1);
}

// ============================================================================
// Resubmitted tile keeps its task
// ============================================================================

#[test]
fn test_resubmitted_tile_keeps_task() {
    let h = Harness::new(2);
    h.script.hold();

    h.scheduler.submit(1, [tile(0)]).unwrap();
    eventually!(h.script.in_flight() == 1, "first render never started");
    let first = h.scheduler.snapshot()[0].clone();

    let summary = h.scheduler.submit(2, [tile(0), tile(8)]).unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.retained, 1);
    assert_eq!(summary.cancelled, 0);

    eventually!(h.script.in_flight() == 2, "second render never started");
    let snap = h.scheduler.snapshot();
    assert_eq!(snap.len(), 2);

    let r1 = snap.iter().find(|t| t.request.key() == tile(0).key()).unwrap();
    let r2 = snap.iter().find(|t| t.request.key() == tile(8).key()).unwrap();
    assert_eq!(r1.id, first.id);
    assert_eq!(r1.epoch, 2);
    assert_eq!(r1.status, TaskStatus::Running);
    assert_eq!(r1.slot, first.slot);
    assert_eq!(r2.status, TaskStatus::Running);
    assert_ne!(r2.slot, r1.slot);

    // R1 was never restarted
    let r1_starts = h
        .script
        .started()
        .iter()
        .filter(|(_, k, _)| *k == tile(0).key())
        .count();
    assert_eq!(r1_starts, 1);

    h.script.release();
    eventually!(h.scheduler.snapshot().is_empty(), "tasks never retired");
}

// ============================================================================
// Tile scrolled out of view while rendering
// ============================================================================

#[test]
fn test_stale_running_tile_is_cancelled() {
    let h = Harness::new(2);
    h.script.hold();

    h.scheduler.submit(1, [tile(0)]).unwrap();
    eventually!(h.script.in_flight() == 1, "render never started");
    let slot = h.scheduler.snapshot()[0].slot.unwrap();

    let summary = h.scheduler.commit(2).unwrap();
    assert_eq!(summary.cancelled, 1);

    eventually!(h.script.cancelled_count() == 1, "renderer never saw cancel");
    eventually!(h.scheduler.snapshot().is_empty(), "stale task never dropped");

    assert_eq!(h.script.cancel_requests(slot), 1);
    assert_eq!(tile_ready_count(&h.drain_events()), 0);
    assert!(h.store.is_empty());
    assert_eq!(h.script.completed_count(), 0);
}

// ============================================================================
// Calibration change while every slot is busy
// ============================================================================

#[test]
fn test_velocity_change_waits_for_barrier() {
    let h = Harness::new(2);
    h.script.hold();
    let initial = h.scheduler.current_fingerprint();

    h.scheduler.submit(1, [tile(0), tile(8)]).unwrap();
    eventually!(h.script.in_flight() == 2, "slots never filled");

    h.scheduler.set_platform_velocity(3.0).unwrap();
    let changed = h
        .wait_event(|e| match e {
            SchedulerEvent::DesiredStateChanged { fingerprint } => Some(*fingerprint),
            _ => None,
        })
        .expect("desired-state-changed");
    assert_ne!(changed, initial);
    assert_eq!(changed, h.scheduler.desired_fingerprint());

    // Both tasks are cancelled by the barrier and rerun under the new velocity
    eventually!(
        h.script.started().iter().filter(|(_, _, v)| *v == 3.0).count() == 2,
        "tiles never re-rendered"
    );
    assert_eq!(h.scheduler.current_fingerprint(), changed);

    let log = h.script.events();
    let first_new = log
        .iter()
        .position(|e| matches!(e, RenderEvent::Configured { velocity, .. } if *velocity == 3.0))
        .unwrap();
    let old_finished = log
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, RenderEvent::Finished { .. }))
        .map(|(i, _)| i)
        .take(2)
        .collect::<Vec<_>>();
    assert_eq!(old_finished.len(), 2);
    assert!(old_finished.iter().all(|i| *i < first_new));

    h.script.release();
    let ready = h.wait_tile_ready(tile(0).key()).unwrap();
    assert_eq!(ready.fingerprint, changed);
    assert!(ready.image.data.iter().all(|v| *v == 3.0));
}
