//! Periodic catch-up sweep.
//!
//! Library events can be missed (the process was down, a hook was disabled
//! at the time). The sweep asks a [`SweepSource`] for every item a queue
//! should still process and tops the queue up. Workers dedup the batch, so
//! re-enqueueing already pending items is harmless.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sw_core::{QueueKind, Result, WorkItem};

use crate::context::SchedulerContext;

/// Enumerates outstanding work per queue.
#[async_trait]
pub trait SweepSource: Send + Sync {
    async fn collect(&self, queue: QueueKind) -> Result<Vec<WorkItem>>;
}

/// One pass over every enabled stage; returns the number of items queued.
pub async fn sweep_once(ctx: &SchedulerContext, source: &dyn SweepSource) -> usize {
    let stages = ctx.config.stages();
    let mut total = 0;
    for kind in QueueKind::ALL {
        if !stages.is_enabled(kind) {
            continue;
        }
        match source.collect(kind).await {
            Ok(items) => {
                let count = items.len();
                for item in items {
                    ctx.enqueue(kind, item);
                }
                if count > 0 {
                    tracing::debug!(queue = %kind, count, "Sweep queued items");
                }
                total += count;
            }
            Err(e) => {
                tracing::warn!(queue = %kind, error = %e, "Sweep failed to collect items");
            }
        }
    }
    total
}

/// Sweep at the configured interval until `cancel` fires.
///
/// Runs once immediately. The interval and enabled flag are re-read after
/// every pass so config reloads apply without a restart.
pub async fn run_sweep(
    ctx: SchedulerContext,
    source: Arc<dyn SweepSource>,
    cancel: CancellationToken,
) {
    tracing::info!("Catch-up sweep started");
    loop {
        let sweep = ctx.config.sweep();
        if sweep.enabled {
            let queued = sweep_once(&ctx, source.as_ref()).await;
            tracing::info!(queued, "Catch-up sweep pass complete");
        }

        let interval = Duration::from_secs(sweep.interval_secs.max(1));
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    tracing::info!("Catch-up sweep stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use sw_core::config::Config;
    use sw_core::{Error, ItemId, WorkOutcome};

    use crate::handler::{DispatchContext, Handlers, QueueHandler};

    struct Noop;

    #[async_trait]
    impl QueueHandler for Noop {
        async fn process(&self, _item: &WorkItem, _ctx: &DispatchContext) -> Result<WorkOutcome> {
            Ok(WorkOutcome::Completed)
        }
    }

    struct Fixed;

    #[async_trait]
    impl SweepSource for Fixed {
        async fn collect(&self, queue: QueueKind) -> Result<Vec<WorkItem>> {
            match queue {
                QueueKind::MediaInfo => Ok(vec![WorkItem::new(ItemId::new())]),
                QueueKind::Fingerprint => Err(Error::Internal("library offline".into())),
                _ => Ok(vec![WorkItem::new(ItemId::new()), WorkItem::new(ItemId::new())]),
            }
        }
    }

    #[tokio::test]
    async fn sweep_skips_disabled_stages_and_errors() {
        let (ctx, _) =
            SchedulerContext::in_memory(&Config::default(), Handlers::uniform(Arc::new(Noop)));
        // media_info 1, fingerprint error, intro_skip 2, episode_refresh disabled.
        assert_eq!(sweep_once(&ctx, &Fixed).await, 3);
        assert_eq!(ctx.queue(QueueKind::MediaInfo).len(), 1);
        assert_eq!(ctx.queue(QueueKind::IntroSkip).len(), 2);
        assert!(ctx.queue(QueueKind::EpisodeRefresh).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_sweep_repeats_until_cancelled() {
        let mut config = Config::default();
        config.sweep.enabled = true;
        config.sweep.interval_secs = 10;
        config.stages.fingerprint = false;
        config.stages.intro_skip = false;
        let (ctx, _) = SchedulerContext::in_memory(&config, Handlers::uniform(Arc::new(Noop)));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_sweep(ctx.clone(), Arc::new(Fixed), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
        handle.await.unwrap();
        // Passes at t=0, 10 and 20.
        assert_eq!(ctx.queue(QueueKind::MediaInfo).len(), 3);
    }
}
