//! Public scheduler handle.

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use storage::{TileCacheAdapter, TileStore};
use waterfall_common::{
    Calibration, PropagationProfile, Renderer, SchedulerError, SchedulerResult, SourceFactory,
    StateHash, TileRequest,
};

use crate::config::SchedulerConfig;
use crate::dispatcher::Dispatcher;
use crate::events::{ChannelListener, Listeners, SchedulerEvent, SchedulerListener};
use crate::queue::{CommitSummary, TaskInfo, TaskQueue};
use crate::slot::{GeneratorSlot, SlotStatus};
use crate::state::ProcessingState;
use crate::stats::{Counters, SchedulerStats};
use crate::worker::{self, Completion, Job};

/// State shared by the handle, the dispatcher and the workers.
pub(crate) struct Shared {
    pub config: SchedulerConfig,
    pub queue: Mutex<TaskQueue>,
    pub state: ProcessingState,
    pub slots: Vec<GeneratorSlot>,
    pub sources: Arc<dyn SourceFactory>,
    pub cache: TileCacheAdapter,
    pub listeners: Listeners,
    pub counters: Counters,
    pub shutdown: AtomicBool,
}

/// Running tile scheduler.
///
/// Owns one dispatcher thread and `max_generators` worker threads. Every
/// method is callable from any thread and returns without waiting on
/// renders. Dropping the handle shuts the threads down.
pub struct TileScheduler {
    shared: Arc<Shared>,
    wake: Sender<()>,
    dispatcher: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl TileScheduler {
    /// Start the scheduler.
    ///
    /// `renderers` is called once per slot index. `store` is optional; without
    /// it tiles are rendered and published but never cached.
    pub fn start<F>(
        config: SchedulerConfig,
        mut renderers: F,
        sources: Arc<dyn SourceFactory>,
        store: Option<Arc<dyn TileStore>>,
    ) -> SchedulerResult<Self>
    where
        F: FnMut(usize) -> Box<dyn Renderer>,
    {
        config.validate()?;
        let n = config.max_generators;

        let slots = (0..n).map(|i| GeneratorSlot::new(i, renderers(i))).collect();
        let shared = Arc::new(Shared {
            queue: Mutex::new(TaskQueue::with_retry_delay(config.wake_interval())),
            state: ProcessingState::new(Arc::clone(&sources)),
            slots,
            sources,
            cache: TileCacheAdapter::new(store),
            listeners: Listeners::default(),
            counters: Counters::default(),
            shutdown: AtomicBool::new(false),
            config,
        });

        let (wake_tx, wake_rx) = channel::bounded::<()>(1);
        let (job_tx, job_rx) = channel::unbounded::<Job>();
        let (done_tx, done_rx) = channel::unbounded::<Completion>();

        let mut workers = Vec::with_capacity(n);
        for i in 0..n {
            let shared = Arc::clone(&shared);
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            workers.push(spawn(format!("tile-worker-{i}"), move || {
                worker::run_worker(i, shared, jobs, done)
            })?);
        }
        drop(done_tx);

        let dispatcher = Dispatcher::new(Arc::clone(&shared), wake_rx, done_rx, job_tx);
        let dispatcher = spawn("tile-dispatcher".to_string(), move || dispatcher.run())?;

        info!(
            max_generators = n,
            cache = shared.cache.is_enabled(),
            fingerprint = %shared.state.current_fingerprint(),
            "Tile scheduler started"
        );

        Ok(Self {
            shared,
            wake: wake_tx,
            dispatcher: Some(dispatcher),
            workers,
        })
    }

    // ------------------------------------------------------------------
    // Task submission
    // ------------------------------------------------------------------

    /// Add a request to the staging list. Nothing runs until [`commit`](Self::commit).
    pub fn stage(&self, request: TileRequest) {
        self.shared.queue.lock().stage(request);
    }

    /// Merge the staging list under `epoch` and wake the dispatcher.
    pub fn commit(&self, epoch: u64) -> SchedulerResult<CommitSummary> {
        self.check_running()?;
        let summary = self.commit_locked(&mut self.shared.queue.lock(), epoch);
        Ok(self.after_commit(summary))
    }

    /// Stage `requests` and commit them in one step.
    pub fn submit(
        &self,
        epoch: u64,
        requests: impl IntoIterator<Item = TileRequest>,
    ) -> SchedulerResult<CommitSummary> {
        self.check_running()?;
        let summary = {
            let mut queue = self.shared.queue.lock();
            for request in requests {
                queue.stage(request);
            }
            self.commit_locked(&mut queue, epoch)
        };
        Ok(self.after_commit(summary))
    }

    /// Throw away staged requests. Returns how many were discarded.
    pub fn discard_staged(&self) -> usize {
        self.shared.queue.lock().discard_staged()
    }

    pub fn current_epoch(&self) -> u64 {
        self.shared.queue.lock().current_epoch()
    }

    /// Every task currently known, in submission order.
    pub fn snapshot(&self) -> Vec<TaskInfo> {
        self.shared.queue.lock().snapshot()
    }

    /// Commit and cancel stale renders under the queue lock. Slots are only
    /// handed to new tasks under the same lock, so a cancel cannot land on
    /// the next job.
    fn commit_locked(&self, queue: &mut TaskQueue, epoch: u64) -> CommitSummary {
        let (summary, cancel) = queue.commit(epoch);
        for &slot in &cancel {
            self.shared.slots[slot].request_cancel();
        }
        self.shared.counters.cancelled(cancel.len());
        summary
    }

    fn after_commit(&self, summary: CommitSummary) -> CommitSummary {
        debug!(
            epoch = summary.epoch,
            created = summary.created,
            retained = summary.retained,
            dropped = summary.dropped,
            cancelled = summary.cancelled,
            "Committed tiles"
        );
        self.wake();
        summary
    }

    // ------------------------------------------------------------------
    // Calibration
    // ------------------------------------------------------------------

    pub fn set_platform_velocity(&self, velocity: f64) -> SchedulerResult<()> {
        self.check_running()?;
        let changed = self.shared.state.set_platform_velocity(velocity)?;
        self.desired_changed(changed);
        Ok(())
    }

    pub fn set_propagation_profile(&self, profile: PropagationProfile) -> SchedulerResult<()> {
        self.check_running()?;
        let changed = self.shared.state.set_propagation_profile(profile)?;
        self.desired_changed(changed);
        Ok(())
    }

    /// Change velocity and profile together, as one calibration change.
    pub fn set_calibration(
        &self,
        velocity: f64,
        profile: PropagationProfile,
    ) -> SchedulerResult<()> {
        self.check_running()?;
        let changed = self.shared.state.set_calibration(velocity, profile)?;
        self.desired_changed(changed);
        Ok(())
    }

    /// Tell the scheduler the source factory was reconfigured. Slots drop
    /// their opened accessors once the change is applied.
    pub fn notify_accessor_factory_changed(&self) -> SchedulerResult<()> {
        self.check_running()?;
        let fingerprint = self.shared.state.notify_accessor_factory_changed();
        self.desired_changed(Some(fingerprint));
        Ok(())
    }

    pub fn desired_fingerprint(&self) -> StateHash {
        self.shared.state.desired_fingerprint()
    }

    pub fn current_fingerprint(&self) -> StateHash {
        self.shared.state.current_fingerprint()
    }

    pub fn current_calibration(&self) -> Arc<Calibration> {
        self.shared.state.current()
    }

    fn desired_changed(&self, fingerprint: Option<StateHash>) {
        if let Some(fingerprint) = fingerprint {
            self.shared
                .listeners
                .emit(SchedulerEvent::DesiredStateChanged { fingerprint });
            self.wake();
        }
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    pub fn subscribe(&self, listener: Arc<dyn SchedulerListener>) {
        self.shared.listeners.add(listener);
    }

    /// Subscribe a channel and return its receiving end.
    pub fn events(&self) -> Receiver<SchedulerEvent> {
        let (listener, rx) = ChannelListener::channel();
        self.subscribe(Arc::new(listener));
        rx
    }

    pub fn slot_statuses(&self) -> Vec<SlotStatus> {
        self.shared.slots.iter().map(|s| s.status()).collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut stats = SchedulerStats {
            max_generators: self.shared.slots.len(),
            desired_fingerprint: self.shared.state.desired_fingerprint(),
            current_fingerprint: self.shared.state.current_fingerprint(),
            ..Default::default()
        };
        for status in self.slot_statuses() {
            match status {
                SlotStatus::Idle => stats.idle_slots += 1,
                SlotStatus::Busy => stats.busy_slots += 1,
                SlotStatus::Retireable => stats.retireable_slots += 1,
            }
        }
        {
            let queue = self.shared.queue.lock();
            let (idle, running, retireable) = queue.counts();
            stats.epoch = queue.current_epoch();
            stats.staged = queue.staged_len();
            stats.queued_tasks = queue.len();
            stats.idle_tasks = idle;
            stats.running_tasks = running;
            stats.retireable_tasks = retireable;
        }
        self.shared.counters.fill(&mut stats);
        stats
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Cancel running renders, stop the dispatcher and join every thread.
    pub fn shutdown(&mut self) {
        let Some(dispatcher) = self.dispatcher.take() else {
            return;
        };
        self.shared.shutdown.store(true, Ordering::Release);
        for slot in &self.shared.slots {
            slot.request_cancel();
        }
        self.wake();

        if dispatcher.join().is_err() {
            warn!("Dispatcher thread panicked");
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
        info!("Tile scheduler stopped");
    }

    fn wake(&self) {
        // A pending wake already covers this one
        let _ = self.wake.try_send(());
    }

    fn check_running(&self) -> SchedulerResult<()> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(SchedulerError::ShutDown);
        }
        Ok(())
    }
}

impl Drop for TileScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn<F>(name: String, f: F) -> SchedulerResult<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(f)
        .map_err(|e| SchedulerError::ThreadSpawn {
            name,
            message: e.to_string(),
        })
}
