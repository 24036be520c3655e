//! Scheduler lifecycle: start, stop and reconfigure the queue workers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sw_core::config::Config;
use sw_core::{QueueKind, WorkItem};

use crate::context::SchedulerContext;
use crate::status::{BudgetStatus, QueueStatus, SchedulerStatus};
use crate::sweep::{self, SweepSource};
use crate::worker::{QueueWorker, WorkerStats};

struct WorkerHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the per-queue workers and their cancellation tokens.
///
/// Each queue has its own token so a single queue can be stopped without
/// touching the others; [`Scheduler::shutdown`] cancels them all.
pub struct Scheduler {
    ctx: SchedulerContext,
    workers: Mutex<HashMap<QueueKind, WorkerHandle>>,
    /// Stats survive worker restarts so status keeps the last counters.
    stats: Mutex<HashMap<QueueKind, Arc<WorkerStats>>>,
    sweep: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Scheduler {
    pub fn new(ctx: SchedulerContext) -> Self {
        Self {
            ctx,
            workers: Mutex::new(HashMap::new()),
            stats: Mutex::new(HashMap::new()),
            sweep: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &SchedulerContext {
        &self.ctx
    }

    /// Size both budgets from the live config and start every worker.
    ///
    /// With `catchup` disabled no worker is started; items still accumulate
    /// in the queues and are picked up by the next start.
    pub fn start(&self) {
        let sched = self.ctx.config.scheduler();
        self.ctx.primary.resize(sched.primary());
        self.ctx.secondary.resize(sched.secondary());

        if !sched.catchup {
            tracing::info!("Catch-up disabled; queue workers not started");
            return;
        }
        for kind in QueueKind::ALL {
            self.start_queue(kind);
        }
    }

    /// Start the worker for one queue unless it is already running.
    ///
    /// Pending items are discarded: a fresh start re-derives its work.
    pub fn start_queue(&self, kind: QueueKind) -> bool {
        if self.is_running(kind) {
            tracing::debug!(queue = %kind, "Queue worker already running");
            return false;
        }

        let cleared = self.ctx.queue(kind).clear();
        if cleared > 0 {
            tracing::debug!(queue = %kind, cleared, "Cleared queue before start");
        }

        let cancel = CancellationToken::new();
        let stats = Arc::new(WorkerStats::new());
        let worker = QueueWorker::new(kind, self.ctx.clone(), cancel.clone(), stats.clone());
        let handle = tokio::spawn(worker.run());

        self.stats.lock().insert(kind, stats);
        self.workers
            .lock()
            .insert(kind, WorkerHandle { cancel, handle });
        true
    }

    /// Cancel one queue's worker and wait for it to exit.
    ///
    /// Returns `false` when the queue had no worker.
    pub async fn stop_queue(&self, kind: QueueKind) -> bool {
        let worker = self.workers.lock().remove(&kind);
        let Some(worker) = worker else {
            return false;
        };
        worker.cancel.cancel();
        if let Err(e) = worker.handle.await {
            tracing::error!(queue = %kind, error = %e, "Queue worker task failed");
        }
        true
    }

    /// Cancel every worker and the sweep, then wait for all of them.
    pub async fn shutdown(&self) {
        let workers: Vec<_> = self.workers.lock().drain().collect();
        let sweep = self.sweep.lock().take();

        for (_, worker) in &workers {
            worker.cancel.cancel();
        }
        if let Some((cancel, _)) = &sweep {
            cancel.cancel();
        }

        for (kind, worker) in workers {
            if let Err(e) = worker.handle.await {
                tracing::error!(queue = %kind, error = %e, "Queue worker task failed");
            }
        }
        if let Some((_, handle)) = sweep {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Sweep task failed");
            }
        }
        tracing::info!("Scheduler shut down");
    }

    pub fn is_running(&self, kind: QueueKind) -> bool {
        self.workers
            .lock()
            .get(&kind)
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Apply a new configuration to the live scheduler.
    ///
    /// The secondary budget is resized immediately; the primary budget keeps
    /// its size until the next [`Scheduler::start`].
    pub fn apply_config(&self, config: &Config) {
        for warning in config.validate() {
            tracing::warn!("Config warning: {warning}");
        }
        self.ctx.config.update(config);

        let sched = &config.scheduler;
        self.ctx.secondary.resize(sched.secondary());
        if sched.primary() != self.ctx.primary.capacity() {
            tracing::warn!(
                current = self.ctx.primary.capacity(),
                configured = sched.primary(),
                "Primary capacity change takes effect on next start"
            );
        }
    }

    /// Re-read the config file and apply it, if one is configured.
    pub fn reload_config(&self) -> bool {
        match self.ctx.config.reload() {
            Some(config) => {
                self.apply_config(&config);
                true
            }
            None => false,
        }
    }

    /// Push an item onto a queue.
    pub fn enqueue(&self, kind: QueueKind, item: WorkItem) {
        self.ctx.enqueue(kind, item);
    }

    /// Start the periodic catch-up sweep, replacing any running one.
    pub fn spawn_sweep(&self, source: Arc<dyn SweepSource>) {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sweep::run_sweep(
            self.ctx.clone(),
            source,
            cancel.clone(),
        ));
        if let Some((previous, _)) = self.sweep.lock().replace((cancel, handle)) {
            previous.cancel();
        }
    }

    /// Point-in-time view of queues, workers and budgets.
    pub fn status(&self) -> SchedulerStatus {
        let stats = self.stats.lock();
        let running: HashMap<QueueKind, bool> = self
            .workers
            .lock()
            .iter()
            .map(|(kind, w)| (*kind, !w.handle.is_finished()))
            .collect();

        let queues = QueueKind::ALL
            .iter()
            .map(|kind| QueueStatus {
                queue: *kind,
                pending: self.ctx.queue(*kind).len(),
                running: running.get(kind).copied().unwrap_or(false),
                worker: stats.get(kind).map(|s| s.snapshot()),
            })
            .collect();

        SchedulerStatus {
            queues,
            primary: BudgetStatus::of(&self.ctx.primary),
            secondary: BudgetStatus::of(&self.ctx.secondary),
            active_scopes: self.ctx.scopes.len(),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for worker in self.workers.get_mut().values() {
            worker.cancel.cancel();
        }
        if let Some((cancel, _)) = self.sweep.get_mut() {
            cancel.cancel();
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("workers", &self.workers.lock().len())
            .finish_non_exhaustive()
    }
}
