//! Synthetic library run for exercising the scheduler end to end.
//!
//! Generates movies and seasons of episodes across a few libraries, feeds
//! them through the library event hooks while some libraries report an
//! active scan, and tallies the scheduler's events until every queue is
//! quiet.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rand::Rng;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use sw_core::config::Config;
use sw_core::events::EventPayload;
use sw_core::{Error, ItemId, LibraryId, QueueKind, Result, SeasonId, WorkItem, WorkOutcome};
use sw_scheduler::handler::{DispatchContext, Handlers, QueueHandler};
use sw_scheduler::worker::WorkerState;
use sw_scheduler::{EnqueueHooks, LibraryEvent, Scheduler, SchedulerContext};

/// Knobs for a simulation run.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Standalone items (movies) to generate.
    pub items: usize,
    /// Seasons to generate, each with a handful of episodes.
    pub seasons: usize,
    pub libraries: usize,
    /// Probability that a unit of work fails.
    pub fail_rate: f64,
    /// Probability that a unit of work reports a skip.
    pub skip_rate: f64,
    /// Upper bound on simulated work duration.
    pub max_work_ms: u64,
    /// Give up waiting for the queues to settle after this long.
    pub timeout: Duration,
}

impl Default for SimulateOptions {
    fn default() -> Self {
        Self {
            items: 20,
            seasons: 3,
            libraries: 2,
            fail_rate: 0.05,
            skip_rate: 0.05,
            max_work_ms: 200,
            timeout: Duration::from_secs(300),
        }
    }
}

/// Per-queue tallies collected from the event bus.
#[derive(Debug, Default, Clone, Serialize)]
pub struct QueueTally {
    pub queued: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub deferred: usize,
    pub cycles: usize,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SimulationSummary {
    pub queues: HashMap<QueueKind, QueueTally>,
    pub handed_off: usize,
    pub seasons_aggregated: usize,
    pub seasons_skipped: usize,
    /// Events the tally missed because it fell behind the bus.
    pub lagged: u64,
    /// Whether every queue went quiet before the timeout.
    pub settled: bool,
}

impl SimulationSummary {
    fn record(&mut self, payload: &EventPayload) {
        match payload {
            EventPayload::ItemQueued { queue, .. } => self.tally(*queue).queued += 1,
            EventPayload::ItemCompleted { queue, .. } => self.tally(*queue).completed += 1,
            EventPayload::ItemSkipped { queue, .. } => self.tally(*queue).skipped += 1,
            EventPayload::ItemFailed { queue, .. } => self.tally(*queue).failed += 1,
            EventPayload::ItemDeferred { queue, .. } => self.tally(*queue).deferred += 1,
            EventPayload::CycleCompleted { queue, .. } => self.tally(*queue).cycles += 1,
            EventPayload::ItemHandedOff { .. } => self.handed_off += 1,
            EventPayload::SeasonAggregated { .. } => self.seasons_aggregated += 1,
            EventPayload::SeasonSkipped { .. } => self.seasons_skipped += 1,
            _ => {}
        }
    }

    fn tally(&mut self, queue: QueueKind) -> &mut QueueTally {
        self.queues.entry(queue).or_default()
    }
}

/// Handler that sleeps for a random while and rolls for an outcome.
#[derive(Debug, Clone)]
pub struct SimulatedLibrary {
    fail_rate: f64,
    skip_rate: f64,
    max_work_ms: u64,
}

impl SimulatedLibrary {
    pub fn new(opts: &SimulateOptions) -> Self {
        Self {
            fail_rate: opts.fail_rate.clamp(0.0, 1.0),
            skip_rate: opts.skip_rate.clamp(0.0, 1.0),
            max_work_ms: opts.max_work_ms.max(1),
        }
    }

    fn roll(&self) -> (Duration, f64) {
        let mut rng = rand::thread_rng();
        (
            Duration::from_millis(rng.gen_range(0..=self.max_work_ms)),
            rng.gen::<f64>(),
        )
    }
}

#[async_trait]
impl QueueHandler for SimulatedLibrary {
    async fn process(&self, item: &WorkItem, ctx: &DispatchContext) -> Result<WorkOutcome> {
        let (delay, roll) = self.roll();
        tokio::select! {
            _ = ctx.cancellation().cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        if roll < self.fail_rate {
            return Err(Error::handler(
                ctx.queue(),
                format!("simulated failure for {}", item.id),
            ));
        }
        if roll < self.fail_rate + self.skip_rate {
            return Ok(WorkOutcome::Skipped);
        }
        if ctx.queue() == QueueKind::MediaInfo {
            Ok(WorkOutcome::CompletedNeedsCooldown)
        } else {
            Ok(WorkOutcome::Completed)
        }
    }

    async fn aggregate_season(
        &self,
        _season_id: SeasonId,
        episodes: &[WorkItem],
        ctx: &DispatchContext,
    ) -> Result<WorkOutcome> {
        let (delay, _) = self.roll();
        tokio::select! {
            _ = ctx.cancellation().cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(delay * episodes.len().max(1) as u32) => {
                Ok(WorkOutcome::Completed)
            }
        }
    }

    fn forward_to_intro_skip(&self, item: &WorkItem) -> bool {
        item.is_episode()
    }
}

/// Build the synthetic library: movies first, then seasons of episodes.
pub fn generate_items(opts: &SimulateOptions) -> Vec<WorkItem> {
    let libraries: Vec<LibraryId> = (0..opts.libraries.max(1))
        .map(|_| LibraryId::new())
        .collect();
    let mut rng = rand::thread_rng();
    let mut items = Vec::with_capacity(opts.items + opts.seasons * 10);

    for i in 0..opts.items {
        let year = rng.gen_range(1980..=2025);
        let premiere = Utc
            .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let mut item = WorkItem::new(ItemId::new())
            .with_library(libraries[i % libraries.len()])
            .with_premiere(premiere);
        if rng.gen_bool(0.1) {
            item = item.as_extra();
        }
        items.push(item);
    }

    for s in 0..opts.seasons {
        let season = SeasonId::new();
        let library = libraries[s % libraries.len()];
        let episodes = rng.gen_range(3..=10);
        for _ in 0..episodes {
            items.push(
                WorkItem::new(ItemId::new())
                    .with_library(library)
                    .with_season(season),
            );
        }
    }
    items
}

/// Run a full simulation and return the event tally.
pub async fn run(config: Config, opts: SimulateOptions) -> SimulationSummary {
    let handler = Arc::new(SimulatedLibrary::new(&opts));
    let (ctx, scans) = SchedulerContext::in_memory(&config, Handlers::uniform(handler));
    let scheduler = Scheduler::new(ctx.clone());
    let hooks = EnqueueHooks::new(ctx.clone());

    let mut rx = ctx.events.subscribe();
    let stop = CancellationToken::new();
    let collector = tokio::spawn({
        let stop = stop.clone();
        async move {
            let mut summary = SimulationSummary::default();
            loop {
                tokio::select! {
                    biased;
                    received = rx.recv() => match received {
                        Ok(event) => summary.record(&event.payload),
                        Err(RecvError::Lagged(n)) => summary.lagged += n,
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        while let Ok(event) = rx.try_recv() {
                            summary.record(&event.payload);
                        }
                        break;
                    }
                }
            }
            summary
        }
    });

    scheduler.start();

    let items = generate_items(&opts);
    let scanning: Vec<LibraryId> = items.iter().filter_map(|i| i.library_id).take(1).collect();
    for library in &scanning {
        scans.begin(*library);
    }
    tracing::info!(items = items.len(), "Feeding synthetic library");
    for item in items {
        hooks.on_event(LibraryEvent::ItemAdded { item });
    }

    let settled = wait_until_quiet(&scheduler, &scans, &scanning, opts.timeout).await;
    scheduler.shutdown().await;
    stop.cancel();

    let mut summary = match collector.await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(error = %e, "Event collector failed");
            SimulationSummary::default()
        }
    };
    summary.settled = settled;
    summary
}

/// Poll until every queue is empty, no permit is out, and every worker is
/// between cycles, twice in a row. Active scans finish after the first
/// poll so deferred items get released.
async fn wait_until_quiet(
    scheduler: &Scheduler,
    scans: &sw_scheduler::ActiveScans,
    scanning: &[LibraryId],
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut quiet_polls = 0;
    let mut first = true;

    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(250)).await;
        if first {
            for library in scanning {
                scans.finish(*library);
            }
            first = false;
        }

        let status = scheduler.status();
        let quiet = status.primary.in_flight == 0
            && status.secondary.in_flight == 0
            && status.queues.iter().all(|q| {
                q.pending == 0
                    && q.worker.as_ref().map_or(true, |w| {
                        matches!(w.state, WorkerState::Idle | WorkerState::Throttling)
                    })
            });
        quiet_polls = if quiet { quiet_polls + 1 } else { 0 };
        if quiet_polls >= 2 {
            return true;
        }
    }
    tracing::warn!("Simulation timed out before the queues settled");
    false
}
