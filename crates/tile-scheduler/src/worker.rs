//! Job execution on the worker pool.
//!
//! A worker receives a job that already owns a claimed slot's workspace,
//! runs it to completion and sends the workspace back. Nothing that goes
//! wrong inside a job leaves the worker: configuration errors, missing
//! sources and renderer panics all end as a [`JobOutcome`].

use crossbeam::channel::{Receiver, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

use waterfall_common::{Calibration, CancelFlag, ImageBuffer, TileRequest};

use crate::events::{SchedulerEvent, TileReady};
use crate::queue::JobOutcome;
use crate::scheduler::Shared;
use crate::slot::SlotWorkspace;

/// One render, bound to a claimed slot.
pub(crate) struct Job {
    pub task_id: u64,
    pub request: TileRequest,
    pub slot: usize,
    pub workspace: SlotWorkspace,
    pub calibration: Arc<Calibration>,
    pub cancel: CancelFlag,
}

pub(crate) struct Completion {
    pub task_id: u64,
    pub slot: usize,
    pub workspace: SlotWorkspace,
    pub outcome: JobOutcome,
}

/// Worker thread body. Returns when the job channel closes.
pub(crate) fn run_worker(
    index: usize,
    shared: Arc<Shared>,
    jobs: Receiver<Job>,
    completions: Sender<Completion>,
) {
    debug!(worker = index, "Worker started");
    for mut job in jobs.iter() {
        let outcome = if shared.shutdown.load(Ordering::Acquire) {
            JobOutcome::Cancelled
        } else {
            match panic::catch_unwind(AssertUnwindSafe(|| execute(&shared, &mut job))) {
                Ok(outcome) => outcome,
                Err(payload) => {
                    error!(
                        slot = job.slot,
                        panic = panic_message(payload.as_ref()),
                        "Renderer panicked, dropping tile"
                    );
                    shared.counters.config_failure();
                    JobOutcome::Failed
                }
            }
        };

        let completion = Completion {
            task_id: job.task_id,
            slot: job.slot,
            workspace: job.workspace,
            outcome,
        };
        if completions.send(completion).is_err() {
            break;
        }
    }
    debug!(worker = index, "Worker stopped");
}

fn execute(shared: &Shared, job: &mut Job) -> JobOutcome {
    let request = job.request;
    let fingerprint = job.calibration.fingerprint;

    let accessors = match job.workspace.resolve(shared.sources.as_ref(), &request) {
        Ok(accessors) => accessors,
        Err(e) => {
            debug!(
                slot = job.slot,
                source = %request.source,
                error = %e,
                "Source not available yet, tile will wait"
            );
            return JobOutcome::Unavailable;
        }
    };

    if let Err(e) = job
        .workspace
        .renderer
        .configure(accessors, Arc::clone(&job.calibration))
    {
        warn!(slot = job.slot, error = %e, "Renderer configuration failed, dropping tile");
        shared.counters.config_failure();
        return JobOutcome::Failed;
    }

    if job.cancel.is_cancelled() {
        return JobOutcome::Cancelled;
    }

    // Header first; the payload only moves on a hit
    let cached = shared
        .cache
        .check(&request, fingerprint)
        .and_then(|_| shared.cache.get(&request, fingerprint));
    if let Some((cached, payload)) = cached {
        let desc = cached.descriptor;
        if let Some(image) = ImageBuffer::from_bytes(desc.width, desc.height, &payload) {
            shared.counters.cache_hit();
            shared.listeners.emit(SchedulerEvent::TileReady(TileReady {
                descriptor: desc,
                image: Arc::new(image),
                byte_len: cached.byte_len,
                fingerprint,
                slot: job.slot,
                from_cache: true,
            }));
            return JobOutcome::CacheHit;
        }
        debug!(slot = job.slot, "Cached payload did not decode, rendering");
    }

    let tile = match job.workspace.renderer.generate(&request, &job.cancel) {
        Some(tile) if !job.cancel.is_cancelled() => tile,
        _ => {
            trace!(slot = job.slot, bounds = %request.bounds.cache_key(), "Render cancelled");
            return JobOutcome::Cancelled;
        }
    };

    let byte_len = tile.image.byte_len();
    shared.counters.tile_rendered();
    shared.listeners.emit(SchedulerEvent::TileReady(TileReady {
        descriptor: tile.descriptor,
        image: Arc::clone(&tile.image),
        byte_len,
        fingerprint,
        slot: job.slot,
        from_cache: false,
    }));
    shared
        .cache
        .put(&request, fingerprint, tile.descriptor, tile.image.to_bytes());

    JobOutcome::Rendered
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown"
    }
}
