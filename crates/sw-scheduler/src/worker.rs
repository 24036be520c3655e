//! Queue worker: the throttled drain / dispatch / settle loop.
//!
//! One [`QueueWorker`] runs per queue. Each cycle waits out the throttle
//! interval, drains the queue, applies admission, lets the handler reduce
//! the batch, then dispatches every candidate under a budget permit. The
//! cycle ends only once everything it dispatched has settled.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use sw_core::config::StageConfig;
use sw_core::events::EventPayload;
use sw_core::{Error, QueueKind, Reduction, Result, SeasonId, WorkItem, WorkOutcome};

use crate::admission::admit;
use crate::barrier::{SeasonBarrier, SeasonVerdict};
use crate::budget::BudgetPermit;
use crate::context::SchedulerContext;
use crate::handler::DispatchContext;
use crate::handoff;
use crate::scope::ItemScope;

/// Lower bound on the throttle so an empty queue never spins.
const MIN_THROTTLE: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// State and counters
// ---------------------------------------------------------------------------

/// Where a worker currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Throttling,
    Draining,
    Dispatching,
    Stopped,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Throttling,
            2 => Self::Draining,
            3 => Self::Dispatching,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Throttling => 1,
            Self::Draining => 2,
            Self::Dispatching => 3,
            Self::Stopped => 4,
        }
    }
}

/// Lock-free counters shared between a worker and status readers.
#[derive(Debug)]
pub struct WorkerStats {
    state: AtomicU8,
    cycles: AtomicU64,
    dispatched: AtomicU64,
    failed: AtomicU64,
    deferred: AtomicU64,
    last_cycle_ms: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerCounters {
    pub state: WorkerState,
    pub cycles: u64,
    pub dispatched: u64,
    pub failed: u64,
    pub deferred: u64,
    pub last_cycle_ms: u64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(WorkerState::Idle.as_u8()),
            cycles: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            deferred: AtomicU64::new(0),
            last_cycle_ms: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn record(&self, report: &CycleReport, elapsed: Duration) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.dispatched
            .fetch_add(report.dispatched as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
        self.deferred
            .fetch_add(report.deferred as u64, Ordering::Relaxed);
        self.last_cycle_ms
            .store(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerCounters {
        WorkerCounters {
            state: self.state(),
            cycles: self.cycles.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            last_cycle_ms: self.last_cycle_ms.load(Ordering::Relaxed),
        }
    }
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Tally of one cycle.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    pub batch: usize,
    pub deferred: usize,
    pub redirected: usize,
    pub dispatched: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub handed_off: usize,
    pub requeued: usize,
}

/// A dispatched operation that has finished.
enum Settled {
    Item {
        item: WorkItem,
        result: Result<WorkOutcome>,
    },
    Season {
        season_id: SeasonId,
        episodes: usize,
        result: Result<WorkOutcome>,
    },
}

// ---------------------------------------------------------------------------
// QueueWorker
// ---------------------------------------------------------------------------

/// Long-running loop for one queue.
pub struct QueueWorker {
    kind: QueueKind,
    ctx: SchedulerContext,
    cancel: CancellationToken,
    stats: Arc<WorkerStats>,
}

impl QueueWorker {
    pub fn new(
        kind: QueueKind,
        ctx: SchedulerContext,
        cancel: CancellationToken,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            kind,
            ctx,
            cancel,
            stats,
        }
    }

    /// Run until the worker's cancellation token fires.
    pub async fn run(self) {
        let kind = self.kind;
        tracing::info!(queue = %kind, "Queue worker started");
        self.ctx
            .events
            .broadcast(EventPayload::WorkerStarted { queue: kind });

        let mut last_start = Instant::now();
        loop {
            self.stats.set_state(WorkerState::Throttling);
            let throttle = self.ctx.config.scheduler().throttle().max(MIN_THROTTLE);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep_until(last_start + throttle) => {}
            }
            last_start = Instant::now();

            if self.ctx.queue(kind).is_empty() {
                self.stats.set_state(WorkerState::Idle);
                continue;
            }

            let report = self.run_cycle().await;
            let elapsed = last_start.elapsed();
            self.stats.record(&report, elapsed);

            tracing::info!(
                queue = %kind,
                batch = report.batch,
                dispatched = report.dispatched,
                completed = report.completed,
                skipped = report.skipped,
                failed = report.failed,
                deferred = report.deferred,
                redirected = report.redirected,
                handed_off = report.handed_off,
                elapsed_ms = elapsed.as_millis() as u64,
                "Cycle complete"
            );
            self.ctx.events.broadcast(EventPayload::CycleCompleted {
                queue: kind,
                dispatched: report.dispatched,
                deferred: report.deferred,
                elapsed_ms: elapsed.as_millis() as u64,
            });

            if self.cancel.is_cancelled() {
                break;
            }
            self.stats.set_state(WorkerState::Idle);
        }

        let pending = self.ctx.queue(kind).len();
        let cancelled = pending > 0;
        if cancelled {
            tracing::info!(queue = %kind, pending, "Queue worker cancelled");
        } else {
            tracing::info!(queue = %kind, "Queue worker stopped");
        }
        self.stats.set_state(WorkerState::Stopped);
        self.ctx.events.broadcast(EventPayload::WorkerStopped {
            queue: kind,
            cancelled,
        });
    }

    /// Drain, admit, reduce, dispatch, settle, requeue.
    pub async fn run_cycle(&self) -> CycleReport {
        let kind = self.kind;
        let sched = self.ctx.config.scheduler();
        let stages = self.ctx.config.stages();

        self.stats.set_state(WorkerState::Draining);
        let batch = self.ctx.queue(kind).drain();
        let mut report = CycleReport {
            batch: batch.len(),
            ..CycleReport::default()
        };
        self.ctx.events.broadcast(EventPayload::CycleStarted {
            queue: kind,
            batch: report.batch,
        });

        let admission = admit(batch, sched.primary(), self.ctx.scans.as_ref());
        report.deferred = admission.deferred.len();
        for item in &admission.deferred {
            if let Some(library_id) = item.library_id {
                tracing::debug!(
                    queue = %kind,
                    item_id = %item.id,
                    library_id = %library_id,
                    "Deferred: library is scanning"
                );
                self.ctx.events.broadcast(EventPayload::ItemDeferred {
                    queue: kind,
                    item_id: item.id,
                    library_id,
                });
            }
        }

        let mut requeue = admission.deferred;
        let candidates = if admission.ready.is_empty() {
            Vec::new()
        } else {
            match self.reduce(admission.ready.clone()).await {
                Ok(reduction) => {
                    report.redirected =
                        handoff::redirect_to_media_info(&self.ctx, kind, reduction.redirect);
                    reduction.ready
                }
                Err(e) => {
                    if e.is_cancelled() {
                        tracing::debug!(queue = %kind, "Reduce cancelled; batch requeued");
                    } else {
                        tracing::warn!(queue = %kind, error = %e, "Reduce failed; batch requeued");
                    }
                    report.requeued = admission.ready.len();
                    requeue.extend(admission.ready);
                    Vec::new()
                }
            }
        };

        let leftover = self.dispatch(candidates, &stages, &mut report).await;
        report.requeued += leftover.len();

        self.ctx
            .queue(kind)
            .enqueue_many(requeue.into_iter().chain(leftover));
        report
    }

    /// Run the handler's reduce step in its own task so a panic only costs
    /// this cycle.
    async fn reduce(&self, batch: Vec<WorkItem>) -> Result<Reduction> {
        let handler = self.ctx.handlers.get(self.kind).clone();
        match tokio::spawn(async move { handler.reduce(batch).await }).await {
            Ok(result) => result,
            Err(e) => Err(Error::Internal(format!("reduce aborted: {e}"))),
        }
    }

    /// Dispatch candidates concurrently, bounded by the queue's budget.
    ///
    /// Returns the candidates that were never dispatched because the worker
    /// was cancelled.
    async fn dispatch(
        &self,
        candidates: Vec<WorkItem>,
        stages: &StageConfig,
        report: &mut CycleReport,
    ) -> Vec<WorkItem> {
        let kind = self.kind;
        let budget = self.ctx.item_budget(kind).clone();
        let cooldown = self.cooldown();

        let mut barrier = if kind == QueueKind::Fingerprint {
            SeasonBarrier::from_candidates(&candidates)
        } else {
            SeasonBarrier::default()
        };
        let mut tasks: JoinSet<Settled> = JoinSet::new();
        let mut pending = candidates.into_iter();
        let mut leftover = Vec::new();

        self.stats.set_state(WorkerState::Dispatching);
        while let Some(item) = pending.next() {
            if self.cancel.is_cancelled() {
                leftover.push(item);
                break;
            }

            // Keep settling finished work while blocked on admission.
            let acquired = {
                let acquire = budget.acquire(&self.cancel);
                tokio::pin!(acquire);
                loop {
                    tokio::select! {
                        acquired = &mut acquire => break acquired,
                        Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                            self.on_settled(joined, &mut barrier, &mut tasks, stages, report);
                        }
                    }
                }
            };
            let permit = match acquired {
                Ok(permit) if !self.cancel.is_cancelled() => permit,
                _ => {
                    leftover.push(item);
                    break;
                }
            };

            self.spawn_item(&mut tasks, item, permit, cooldown);
            report.dispatched += 1;
        }
        leftover.extend(pending);

        for item in &leftover {
            if let Some(verdict) = barrier.abandon(item) {
                self.on_verdict(verdict, &mut tasks);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.on_settled(joined, &mut barrier, &mut tasks, stages, report);
        }

        for season_id in barrier.into_open() {
            tracing::info!(
                queue = %kind,
                season_id = %season_id,
                "Season incomplete; skipped this cycle"
            );
            self.ctx
                .events
                .broadcast(EventPayload::SeasonSkipped { season_id });
        }

        leftover
    }

    /// Pacing delay after a cooldown signal, when the primary budget is
    /// serialized.
    fn cooldown(&self) -> Option<Duration> {
        if self.kind == QueueKind::EpisodeRefresh {
            return None;
        }
        self.ctx
            .config
            .scheduler()
            .cooldown_for(self.ctx.primary.capacity())
    }

    fn spawn_item(
        &self,
        tasks: &mut JoinSet<Settled>,
        item: WorkItem,
        permit: BudgetPermit,
        cooldown: Option<Duration>,
    ) {
        let kind = self.kind;
        let handler = self.ctx.handlers.get(kind).clone();
        let scope = ItemScope::new(item.id, kind);
        let guard = self.ctx.scopes.enter(scope.clone());
        let dispatch_ctx = DispatchContext::new(kind, self.cancel.clone()).with_scope(scope);
        let cancel = self.cancel.clone();

        tracing::debug!(queue = %kind, item_id = %item.id, "Dispatching");
        tasks.spawn(async move {
            let _permit = permit;
            let _scope = guard;

            // A panicking handler only fails its own item.
            let unit = {
                let item = item.clone();
                tokio::spawn(async move { handler.process(&item, &dispatch_ctx).await })
            };
            let result = match unit.await {
                Ok(result) => result,
                Err(e) => Err(Error::Internal(format!("unit of work aborted: {e}"))),
            };

            if let (Ok(outcome), Some(delay)) = (&result, cooldown) {
                if outcome.needs_cooldown() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {}
                    }
                }
            }

            Settled::Item { item, result }
        });
    }

    fn on_settled(
        &self,
        joined: std::result::Result<Settled, JoinError>,
        barrier: &mut SeasonBarrier,
        tasks: &mut JoinSet<Settled>,
        stages: &StageConfig,
        report: &mut CycleReport,
    ) {
        let kind = self.kind;
        let settled = match joined {
            Ok(settled) => settled,
            Err(e) => {
                tracing::error!(queue = %kind, error = %e, "Dispatch task failed to settle");
                report.failed += 1;
                return;
            }
        };

        match settled {
            Settled::Item { item, result } => {
                let blocks_season = match &result {
                    Ok(WorkOutcome::Skipped) => {
                        tracing::debug!(queue = %kind, item_id = %item.id, "Skipped");
                        report.skipped += 1;
                        self.ctx.events.broadcast(EventPayload::ItemSkipped {
                            queue: kind,
                            item_id: item.id,
                        });
                        true
                    }
                    Ok(_) => {
                        tracing::debug!(queue = %kind, item_id = %item.id, "Completed");
                        report.completed += 1;
                        self.ctx.events.broadcast(EventPayload::ItemCompleted {
                            queue: kind,
                            item_id: item.id,
                        });
                        if handoff::forward_completed(&self.ctx, kind, &item, stages) {
                            report.handed_off += 1;
                        }
                        false
                    }
                    Err(e) if e.is_cancelled() => {
                        tracing::debug!(queue = %kind, item_id = %item.id, "Cancelled");
                        true
                    }
                    Err(e) => {
                        tracing::warn!(queue = %kind, item_id = %item.id, error = %e, "Failed");
                        report.failed += 1;
                        self.ctx.events.broadcast(EventPayload::ItemFailed {
                            queue: kind,
                            item_id: item.id,
                            error: e.to_string(),
                        });
                        false
                    }
                };
                if let Some(verdict) = barrier.settle(&item, blocks_season) {
                    self.on_verdict(verdict, tasks);
                }
            }
            Settled::Season {
                season_id,
                episodes,
                result,
            } => match result {
                Ok(WorkOutcome::Skipped) => {
                    tracing::info!(
                        queue = %kind,
                        season_id = %season_id,
                        "Season aggregation skipped"
                    );
                    self.ctx
                        .events
                        .broadcast(EventPayload::SeasonSkipped { season_id });
                }
                Ok(_) => {
                    tracing::info!(
                        queue = %kind,
                        season_id = %season_id,
                        episodes,
                        "Season aggregated"
                    );
                    self.ctx
                        .events
                        .broadcast(EventPayload::SeasonAggregated { season_id, episodes });
                }
                Err(e) if e.is_cancelled() => {
                    tracing::info!(
                        queue = %kind,
                        season_id = %season_id,
                        "Season aggregation cancelled; will retry in a later cycle"
                    );
                    self.ctx
                        .events
                        .broadcast(EventPayload::SeasonSkipped { season_id });
                }
                Err(e) => {
                    tracing::warn!(
                        queue = %kind,
                        season_id = %season_id,
                        error = %e,
                        "Season aggregation failed"
                    );
                    report.failed += 1;
                }
            },
        }
    }

    fn on_verdict(&self, verdict: SeasonVerdict, tasks: &mut JoinSet<Settled>) {
        let kind = self.kind;
        match verdict {
            SeasonVerdict::Skip { season_id } => {
                tracing::info!(
                    queue = %kind,
                    season_id = %season_id,
                    "Season skipped; will retry in a later cycle"
                );
                self.ctx
                    .events
                    .broadcast(EventPayload::SeasonSkipped { season_id });
            }
            SeasonVerdict::Aggregate {
                season_id,
                episodes,
            } => {
                let handler = self.ctx.handlers.get(kind).clone();
                let secondary = self.ctx.secondary.clone();
                let cancel = self.cancel.clone();
                let dispatch_ctx = DispatchContext::new(kind, cancel.clone());

                tracing::debug!(
                    queue = %kind,
                    season_id = %season_id,
                    episodes = episodes.len(),
                    "Dispatching season aggregation"
                );
                tasks.spawn(async move {
                    let result = match secondary.acquire(&cancel).await {
                        Ok(_permit) => {
                            handler
                                .aggregate_season(season_id, &episodes, &dispatch_ctx)
                                .await
                        }
                        Err(e) => Err(e),
                    };
                    Settled::Season {
                        season_id,
                        episodes: episodes.len(),
                        result,
                    }
                });
            }
        }
    }
}
