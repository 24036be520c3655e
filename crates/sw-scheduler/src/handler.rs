//! The orchestrator boundary.
//!
//! Everything the scheduler does not decide for itself (which items are
//! worth processing, in which order, and the processing itself) sits behind
//! [`QueueHandler`]. One handler instance serves one queue.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sw_core::{Error, QueueKind, Reduction, Result, SeasonId, WorkItem, WorkOutcome};

use crate::scope::ItemScope;

/// Execution context handed to a unit of work.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    queue: QueueKind,
    cancel: CancellationToken,
    scope: Option<ItemScope>,
}

impl DispatchContext {
    pub fn new(queue: QueueKind, cancel: CancellationToken) -> Self {
        Self {
            queue,
            cancel,
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: ItemScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn queue(&self) -> QueueKind {
        self.queue
    }

    /// Per-item scope; `None` for season aggregation.
    pub fn scope(&self) -> Option<&ItemScope> {
        self.scope.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Early-return helper for long-running work: `ctx.check_cancelled()?;`.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Queue-specific business logic plugged into a worker.
#[async_trait]
pub trait QueueHandler: Send + Sync {
    /// Reduce a raw admitted batch into the authoritative candidate list.
    ///
    /// May consult live library state and must tolerate overlapping inputs
    /// across calls. The default keeps everything in [`default_order`].
    async fn reduce(&self, batch: Vec<WorkItem>) -> Result<Reduction> {
        let mut ready = batch;
        default_order(&mut ready);
        Ok(Reduction::ready(ready))
    }

    /// Perform the unit of work for one item.
    async fn process(&self, item: &WorkItem, ctx: &DispatchContext) -> Result<WorkOutcome>;

    /// Season-level aggregation once every episode of the season settled.
    ///
    /// Only called for the fingerprint queue.
    async fn aggregate_season(
        &self,
        _season_id: SeasonId,
        _episodes: &[WorkItem],
        _ctx: &DispatchContext,
    ) -> Result<WorkOutcome> {
        Ok(WorkOutcome::Completed)
    }

    /// Whether a completed media info item should continue into intro skip.
    fn forward_to_intro_skip(&self, _item: &WorkItem) -> bool {
        false
    }
}

/// Non-extras before extras, then newest premiere first (unknown dates last).
pub fn default_order(items: &mut [WorkItem]) {
    items.sort_by(|a, b| {
        a.is_extra
            .cmp(&b.is_extra)
            .then_with(|| b.premiere.cmp(&a.premiere))
    });
}

/// One handler per queue.
#[derive(Clone)]
pub struct Handlers {
    pub media_info: Arc<dyn QueueHandler>,
    pub fingerprint: Arc<dyn QueueHandler>,
    pub intro_skip: Arc<dyn QueueHandler>,
    pub episode_refresh: Arc<dyn QueueHandler>,
}

impl Handlers {
    /// Use the same handler for every queue; it can branch on
    /// [`DispatchContext::queue`].
    pub fn uniform(handler: Arc<dyn QueueHandler>) -> Self {
        Self {
            media_info: handler.clone(),
            fingerprint: handler.clone(),
            intro_skip: handler.clone(),
            episode_refresh: handler,
        }
    }

    pub fn get(&self, kind: QueueKind) -> &Arc<dyn QueueHandler> {
        match kind {
            QueueKind::MediaInfo => &self.media_info,
            QueueKind::Fingerprint => &self.fingerprint,
            QueueKind::IntroSkip => &self.intro_skip,
            QueueKind::EpisodeRefresh => &self.episode_refresh,
        }
    }
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sw_core::ItemId;

    struct Noop;

    #[async_trait]
    impl QueueHandler for Noop {
        async fn process(&self, _item: &WorkItem, _ctx: &DispatchContext) -> Result<WorkOutcome> {
            Ok(WorkOutcome::Completed)
        }
    }

    #[test]
    fn default_order_extras_last_newest_first() {
        let old = WorkItem::new(ItemId::new())
            .with_premiere(Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap());
        let new = WorkItem::new(ItemId::new())
            .with_premiere(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        let undated = WorkItem::new(ItemId::new());
        let extra = WorkItem::new(ItemId::new())
            .with_premiere(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
            .as_extra();

        let mut items = vec![extra.clone(), undated.clone(), old.clone(), new.clone()];
        default_order(&mut items);
        let ids: Vec<_> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![new.id, old.id, undated.id, extra.id]);
    }

    #[tokio::test]
    async fn default_reduce_keeps_everything() {
        let batch = vec![WorkItem::new(ItemId::new()), WorkItem::new(ItemId::new())];
        let reduction = Noop.reduce(batch.clone()).await.unwrap();
        assert_eq!(reduction.ready.len(), 2);
        assert!(reduction.redirect.is_empty());
    }

    #[test]
    fn check_cancelled_reports_cancellation() {
        let cancel = CancellationToken::new();
        let ctx = DispatchContext::new(QueueKind::MediaInfo, cancel.clone());
        assert!(ctx.check_cancelled().is_ok());
        cancel.cancel();
        assert!(ctx.check_cancelled().unwrap_err().is_cancelled());
    }
}
