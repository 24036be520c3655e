//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which wires a [`Scheduler`] to a scriptable
//! [`Recorder`] handler over an in-memory config and scan tracker.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use sw_core::config::Config;
use sw_core::events::EventPayload;
use sw_core::{Error, ItemId, QueueKind, Reduction, Result, SeasonId, WorkItem, WorkOutcome};
use sw_scheduler::handler::{default_order, DispatchContext, Handlers, QueueHandler};
use sw_scheduler::{ActiveScans, Scheduler, SchedulerContext};

/// What the recorder does when asked to process an item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Script {
    Complete,
    Cooldown,
    Skip,
    Fail,
    Panic,
    /// Block until cancelled.
    Hang,
}

/// Handler that records every call and follows per-item scripts.
#[derive(Default)]
pub struct Recorder {
    delay: Duration,
    forward: bool,
    scripts: Mutex<HashMap<ItemId, Script>>,
    redirect: Mutex<HashSet<ItemId>>,
    pub processed: Mutex<Vec<(QueueKind, ItemId, Instant)>>,
    finished: Mutex<HashMap<ItemId, Instant>>,
    pub aggregated: Mutex<Vec<(SeasonId, usize)>>,
    aggregate_started: Mutex<HashMap<SeasonId, Instant>>,
    reduce_panics: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated duration of every unit of work.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Forward every completed media info item to intro skip.
    pub fn forwarding(mut self) -> Self {
        self.forward = true;
        self
    }

    pub fn script(&self, id: ItemId, script: Script) {
        self.scripts.lock().insert(id, script);
    }

    /// Have `reduce` hand `id` back to media info.
    pub fn redirect(&self, id: ItemId) {
        self.redirect.lock().insert(id);
    }

    /// Panic in the next `times` calls to `reduce`.
    pub fn panic_next_reduces(&self, times: usize) {
        self.reduce_panics.store(times, Ordering::SeqCst);
    }

    pub fn processed_on(&self, queue: QueueKind) -> Vec<ItemId> {
        self.processed
            .lock()
            .iter()
            .filter(|(q, _, _)| *q == queue)
            .map(|(_, id, _)| *id)
            .collect()
    }

    pub fn started_at(&self, queue: QueueKind) -> Vec<Instant> {
        self.processed
            .lock()
            .iter()
            .filter(|(q, _, _)| *q == queue)
            .map(|(_, _, at)| *at)
            .collect()
    }

    /// When the last unit of work for `id` returned.
    pub fn finished_at(&self, id: ItemId) -> Option<Instant> {
        self.finished.lock().get(&id).copied()
    }

    pub fn aggregate_started_at(&self, season_id: SeasonId) -> Option<Instant> {
        self.aggregate_started.lock().get(&season_id).copied()
    }

    /// Highest number of units of work observed running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct Running<'a>(&'a AtomicUsize);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl QueueHandler for Recorder {
    async fn reduce(&self, batch: Vec<WorkItem>) -> Result<Reduction> {
        let panics = self.reduce_panics.load(Ordering::SeqCst);
        if panics > 0 {
            self.reduce_panics.store(panics - 1, Ordering::SeqCst);
            panic!("scripted reduce panic");
        }
        let redirect = self.redirect.lock().clone();
        let (redirect, mut ready): (Vec<_>, Vec<_>) =
            batch.into_iter().partition(|item| redirect.contains(&item.id));
        default_order(&mut ready);
        Ok(Reduction { ready, redirect })
    }

    async fn process(&self, item: &WorkItem, ctx: &DispatchContext) -> Result<WorkOutcome> {
        self.processed
            .lock()
            .push((ctx.queue(), item.id, Instant::now()));
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _running = Running(&self.running);

        let script = self
            .scripts
            .lock()
            .get(&item.id)
            .copied()
            .unwrap_or(Script::Complete);

        if script == Script::Hang {
            ctx.cancellation().cancelled().await;
            return Err(Error::Cancelled);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.finished.lock().insert(item.id, Instant::now());

        match script {
            Script::Complete | Script::Hang => Ok(WorkOutcome::Completed),
            Script::Cooldown => Ok(WorkOutcome::CompletedNeedsCooldown),
            Script::Skip => Ok(WorkOutcome::Skipped),
            Script::Fail => Err(Error::handler(ctx.queue(), "scripted failure")),
            Script::Panic => panic!("scripted panic"),
        }
    }

    async fn aggregate_season(
        &self,
        season_id: SeasonId,
        episodes: &[WorkItem],
        _ctx: &DispatchContext,
    ) -> Result<WorkOutcome> {
        self.aggregate_started
            .lock()
            .insert(season_id, Instant::now());
        self.aggregated.lock().push((season_id, episodes.len()));
        Ok(WorkOutcome::Completed)
    }

    fn forward_to_intro_skip(&self, _item: &WorkItem) -> bool {
        self.forward
    }
}

/// Test harness wrapping a [`Scheduler`] and its [`Recorder`].
pub struct TestHarness {
    pub scheduler: Scheduler,
    pub ctx: SchedulerContext,
    pub scans: Arc<ActiveScans>,
    pub recorder: Arc<Recorder>,
}

impl TestHarness {
    /// Default config with a one second throttle.
    pub fn new() -> Self {
        Self::with_config(fast_config(), Recorder::new())
    }

    pub fn with_recorder(recorder: Recorder) -> Self {
        Self::with_config(fast_config(), recorder)
    }

    pub fn with_config(config: Config, recorder: Recorder) -> Self {
        let recorder = Arc::new(recorder);
        let (ctx, scans) =
            SchedulerContext::in_memory(&config, Handlers::uniform(recorder.clone()));
        let scheduler = Scheduler::new(ctx.clone());
        Self {
            scheduler,
            ctx,
            scans,
            recorder,
        }
    }

    pub fn enqueue(&self, kind: QueueKind, item: &WorkItem) {
        self.scheduler.enqueue(kind, item.clone());
    }

    /// Events in the order they were emitted.
    pub fn events(&self) -> Vec<EventPayload> {
        let mut events: Vec<_> = self
            .ctx
            .events
            .recent_events(usize::MAX)
            .into_iter()
            .map(|e| e.payload)
            .collect();
        events.reverse();
        events
    }
}

pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.scheduler.throttle_secs = 1;
    config
}

pub fn items(n: usize) -> Vec<WorkItem> {
    (0..n).map(|_| WorkItem::new(ItemId::new())).collect()
}

pub fn season(n: usize) -> (SeasonId, Vec<WorkItem>) {
    let season_id = SeasonId::new();
    let episodes = (0..n)
        .map(|_| WorkItem::new(ItemId::new()).with_season(season_id))
        .collect();
    (season_id, episodes)
}

/// Let paused time run forward.
pub async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}
