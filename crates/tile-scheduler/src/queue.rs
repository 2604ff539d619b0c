//! Task queue with two-phase submission.
//!
//! Requests are staged, then committed under an epoch. A commit matches
//! staged requests against existing tasks by [`TileKey`]; matches keep their
//! identity and take the new epoch, everything else left on an older epoch
//! is stale.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use waterfall_common::{TileKey, TileRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    Idle,
    Running,
    Retireable,
}

/// Diagnostic view of one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskInfo {
    pub id: u64,
    pub request: TileRequest,
    pub epoch: u64,
    pub status: TaskStatus,
    pub slot: Option<usize>,
}

/// What a commit did to the task set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub epoch: u64,
    /// New tasks.
    pub created: usize,
    /// Existing tasks moved to the new epoch.
    pub retained: usize,
    /// Stale idle tasks removed.
    pub dropped: usize,
    /// Stale running tasks whose slot was asked to cancel.
    pub cancelled: usize,
}

/// How a job ended, as reported back to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Rendered,
    CacheHit,
    /// The renderer returned no image.
    Cancelled,
    /// Accessors could not be opened yet.
    Unavailable,
    /// Configure failed or the renderer panicked.
    Failed,
}

#[derive(Debug)]
struct Task {
    id: u64,
    request: TileRequest,
    epoch: u64,
    status: TaskStatus,
    slot: Option<usize>,
    cancel_requested: bool,
    // Set while waiting for an unavailable source
    not_before: Option<Instant>,
}

/// Authoritative task set plus the staging list.
#[derive(Debug, Default)]
pub struct TaskQueue {
    // Keyed by id so iteration follows submission order
    tasks: BTreeMap<u64, Task>,
    by_key: HashMap<TileKey, u64>,
    staged: Vec<TileRequest>,
    epoch: u64,
    next_id: u64,
    retry_delay: Duration,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue that holds back tasks whose source was unavailable for
    /// `retry_delay` before offering them again.
    pub fn with_retry_delay(retry_delay: Duration) -> Self {
        Self {
            retry_delay,
            ..Self::default()
        }
    }

    pub fn stage(&mut self, request: TileRequest) {
        self.staged.push(request);
    }

    pub fn discard_staged(&mut self) -> usize {
        let n = self.staged.len();
        self.staged.clear();
        n
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Merge the staging list under `epoch`.
    ///
    /// Returns the summary and the slots of stale running tasks that need a
    /// cancellation request. Each running task is reported at most once over
    /// its lifetime in that state.
    pub fn commit(&mut self, epoch: u64) -> (CommitSummary, Vec<usize>) {
        let mut summary = CommitSummary {
            epoch,
            ..Default::default()
        };

        for request in std::mem::take(&mut self.staged) {
            let key = request.key();
            match self.by_key.get(&key).and_then(|id| self.tasks.get_mut(id)) {
                Some(task) => {
                    if task.epoch != epoch {
                        summary.retained += 1;
                    }
                    task.epoch = epoch;
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.tasks.insert(
                        id,
                        Task {
                            id,
                            request,
                            epoch,
                            status: TaskStatus::Idle,
                            slot: None,
                            cancel_requested: false,
                            not_before: None,
                        },
                    );
                    self.by_key.insert(key, id);
                    summary.created += 1;
                }
            }
        }
        self.epoch = epoch;

        let mut cancel_slots = Vec::new();
        let mut stale_idle = Vec::new();
        for task in self.tasks.values_mut() {
            if task.epoch == epoch {
                continue;
            }
            match task.status {
                TaskStatus::Idle => stale_idle.push(task.id),
                TaskStatus::Running if !task.cancel_requested => {
                    task.cancel_requested = true;
                    if let Some(slot) = task.slot {
                        cancel_slots.push(slot);
                    }
                    summary.cancelled += 1;
                }
                _ => {}
            }
        }
        for id in stale_idle {
            self.remove(id);
            summary.dropped += 1;
        }

        (summary, cancel_slots)
    }

    /// Remove stale idle tasks and every retireable task.
    pub fn prune(&mut self) -> usize {
        let epoch = self.epoch;
        let doomed: Vec<u64> = self
            .tasks
            .values()
            .filter(|t| match t.status {
                TaskStatus::Retireable => true,
                TaskStatus::Idle => t.epoch != epoch,
                TaskStatus::Running => false,
            })
            .map(|t| t.id)
            .collect();
        for id in &doomed {
            self.remove(*id);
        }
        doomed.len()
    }

    /// Fresh idle tasks in submission order, skipping tasks still waiting
    /// out an unavailable source.
    pub fn assignable(&self) -> Vec<(u64, TileRequest)> {
        let now = Instant::now();
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Idle && t.epoch == self.epoch)
            .filter(|t| t.not_before.map_or(true, |at| at <= now))
            .map(|t| (t.id, t.request))
            .collect()
    }

    /// Make every waiting task assignable again, e.g. after the source
    /// factory changed.
    pub fn release_waiting(&mut self) -> usize {
        let mut released = 0;
        for task in self.tasks.values_mut() {
            if task.not_before.take().is_some() {
                released += 1;
            }
        }
        released
    }

    pub fn mark_running(&mut self, id: u64, slot: usize) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.status = TaskStatus::Running;
            task.slot = Some(slot);
            task.cancel_requested = false;
            task.not_before = None;
        }
    }

    /// Request cancellation of every running task not already cancelled.
    /// Returns the affected slots.
    pub fn cancel_running(&mut self) -> Vec<usize> {
        self.tasks
            .values_mut()
            .filter(|t| t.status == TaskStatus::Running && !t.cancel_requested)
            .filter_map(|t| {
                t.cancel_requested = true;
                t.slot
            })
            .collect()
    }

    /// Record the end of a job.
    ///
    /// A fresh task whose render was cancelled at our request goes back to
    /// idle so it renders again. A fresh task whose source was unavailable
    /// goes back to idle and waits `retry_delay` before the next attempt.
    /// Everything else becomes retireable.
    pub fn complete(&mut self, id: u64, outcome: JobOutcome) {
        let epoch = self.epoch;
        let retry_delay = self.retry_delay;
        let Some(task) = self.tasks.get_mut(&id) else {
            return;
        };
        task.slot = None;
        let fresh = task.epoch == epoch;
        let status = match outcome {
            JobOutcome::Cancelled if fresh && task.cancel_requested => TaskStatus::Idle,
            JobOutcome::Unavailable if fresh => {
                task.not_before = Some(Instant::now() + retry_delay);
                TaskStatus::Idle
            }
            _ => TaskStatus::Retireable,
        };
        task.cancel_requested = false;
        task.status = status;
    }

    pub fn is_stale(&self, id: u64) -> bool {
        self.tasks.get(&id).map_or(true, |t| t.epoch != self.epoch)
    }

    pub fn snapshot(&self) -> Vec<TaskInfo> {
        self.tasks
            .values()
            .map(|t| TaskInfo {
                id: t.id,
                request: t.request,
                epoch: t.epoch,
                status: t.status,
                slot: t.slot,
            })
            .collect()
    }

    /// Task counts by status: (idle, running, retireable).
    pub fn counts(&self) -> (usize, usize, usize) {
        self.tasks
            .values()
            .fold((0, 0, 0), |(i, r, x), t| match t.status {
                TaskStatus::Idle => (i + 1, r, x),
                TaskStatus::Running => (i, r + 1, x),
                TaskStatus::Retireable => (i, r, x + 1),
            })
    }

    fn remove(&mut self, id: u64) {
        if let Some(task) = self.tasks.remove(&id) {
            self.by_key.remove(&task.request.key());
        }
    }
}
