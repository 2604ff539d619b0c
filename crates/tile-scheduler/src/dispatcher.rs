//! The reconciliation loop.
//!
//! One thread owns every status transition. Each sweep:
//! 1. applies a pending calibration change once all slots have drained,
//! 2. returns retireable slots to idle,
//! 3. prunes dead tasks and hands fresh idle tasks to idle slots.

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use crossbeam::select;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::events::SchedulerEvent;
use crate::queue::JobOutcome;
use crate::scheduler::Shared;
use crate::slot::SlotStatus;
use crate::stats;
use crate::worker::{Completion, Job};

pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
    wake: Receiver<()>,
    completions: Receiver<Completion>,
    jobs: Sender<Job>,
}

impl Dispatcher {
    pub(crate) fn new(
        shared: Arc<Shared>,
        wake: Receiver<()>,
        completions: Receiver<Completion>,
        jobs: Sender<Job>,
    ) -> Self {
        Self {
            shared,
            wake,
            completions,
            jobs,
        }
    }

    pub(crate) fn run(self) {
        let interval = self.shared.config.wake_interval();
        info!(
            slots = self.shared.slots.len(),
            wake_interval_ms = interval.as_millis() as u64,
            "Dispatcher started"
        );

        loop {
            select! {
                recv(self.wake) -> msg => {
                    if msg.is_err() {
                        break;
                    }
                }
                recv(self.completions) -> msg => match msg {
                    Ok(completion) => self.complete(completion),
                    Err(_) => break,
                },
                default(interval) => {}
            }
            if self.shared.shutdown.load(Ordering::Acquire) {
                break;
            }
            self.sweep();
        }

        info!("Dispatcher stopped");
    }

    fn sweep(&self) {
        while let Ok(completion) = self.completions.try_recv() {
            self.complete(completion);
        }

        let settled = self.barrier();
        self.reclaim();

        let calibration = self.shared.state.current();
        let mut jobs = Vec::new();
        let (pruned, queued) = {
            let mut queue = self.shared.queue.lock();
            let pruned = queue.prune();
            if settled {
                for (task_id, request) in queue.assignable() {
                    let Some((slot, workspace, cancel)) = self
                        .shared
                        .slots
                        .iter()
                        .find_map(|s| s.try_claim().map(|(ws, c)| (s.index(), ws, c)))
                    else {
                        break;
                    };
                    queue.mark_running(task_id, slot);
                    jobs.push(Job {
                        task_id,
                        request,
                        slot,
                        workspace,
                        calibration: Arc::clone(&calibration),
                        cancel,
                    });
                }
            }
            (pruned, queue.len())
        };

        let assigned = jobs.len();
        for job in jobs {
            if let Err(returned) = self.jobs.send(job) {
                // Workers are gone; give the slot back
                let job = returned.into_inner();
                error!(slot = job.slot, "Worker pool closed, job not started");
                self.complete(Completion {
                    task_id: job.task_id,
                    slot: job.slot,
                    workspace: job.workspace,
                    outcome: JobOutcome::Failed,
                });
            }
        }

        if pruned > 0 || assigned > 0 {
            debug!(pruned, assigned, queued, "Sweep");
        }
        let busy = self
            .shared
            .slots
            .iter()
            .filter(|s| s.status() == SlotStatus::Busy)
            .count();
        stats::record_gauges(busy, queued);
    }

    /// Apply a pending calibration change. Returns false while a change is
    /// still waiting for slots to drain.
    fn barrier(&self) -> bool {
        if !self.shared.state.is_changed() {
            return true;
        }

        let cancelled = self.shared.queue.lock().cancel_running();
        for &slot in &cancelled {
            self.shared.slots[slot].request_cancel();
        }
        self.shared.counters.cancelled(cancelled.len());

        let timeout = self.shared.config.barrier_timeout();
        let poll = self.shared.config.barrier_poll();
        let start = Instant::now();
        loop {
            let busy: Vec<usize> = self
                .shared
                .slots
                .iter()
                .filter(|s| s.status() == SlotStatus::Busy)
                .map(|s| s.index())
                .collect();
            if busy.is_empty() {
                break;
            }

            let waited = start.elapsed();
            if waited >= timeout {
                error!(
                    busy_slots = ?busy,
                    waited_ms = waited.as_millis() as u64,
                    "Calibration change blocked by busy slots, will retry"
                );
                self.shared.counters.barrier_stall();
                self.shared
                    .listeners
                    .emit(SchedulerEvent::BarrierStalled {
                        busy_slots: busy,
                        waited,
                    });
                return false;
            }

            match self.completions.recv_timeout(poll.min(timeout - waited)) {
                Ok(completion) => self.complete(completion),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return false,
            }
            if self.shared.shutdown.load(Ordering::Acquire) {
                return false;
            }
        }

        let applied = self.shared.state.apply();
        if applied.accessors_changed {
            for slot in &self.shared.slots {
                slot.clear_accessors();
            }
            let released = self.shared.queue.lock().release_waiting();
            if released > 0 {
                debug!(released, "Retrying tasks after source factory change");
            }
        }
        self.shared.counters.state_applied();
        info!(
            fingerprint = %applied.calibration.fingerprint,
            velocity = applied.calibration.platform_velocity,
            accessors_reset = applied.accessors_changed,
            drained_ms = start.elapsed().as_millis() as u64,
            "Calibration applied"
        );
        self.shared.listeners.emit(SchedulerEvent::StateApplied {
            fingerprint: applied.calibration.fingerprint,
        });
        true
    }

    fn reclaim(&self) {
        let reclaimed = self.shared.slots.iter().filter(|s| s.reclaim()).count();
        if reclaimed > 0 {
            self.shared
                .listeners
                .emit(SchedulerEvent::SlotsAvailable { reclaimed });
        }
    }

    fn complete(&self, completion: Completion) {
        self.shared
            .queue
            .lock()
            .complete(completion.task_id, completion.outcome);
        self.shared.slots[completion.slot].finish(completion.workspace);
    }
}
