//! Library event hooks that feed the queues.

use serde::{Deserialize, Serialize};

use sw_core::{QueueKind, WorkItem};

use crate::context::SchedulerContext;

/// A change in the library the scheduler reacts to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LibraryEvent {
    ItemAdded { item: WorkItem },
    ItemUpdated { item: WorkItem },
    ItemFavorited { item: WorkItem },
}

impl LibraryEvent {
    pub fn item(&self) -> &WorkItem {
        match self {
            Self::ItemAdded { item }
            | Self::ItemUpdated { item }
            | Self::ItemFavorited { item } => item,
        }
    }
}

/// Routes library events onto the queues of enabled stages.
#[derive(Debug, Clone)]
pub struct EnqueueHooks {
    ctx: SchedulerContext,
}

impl EnqueueHooks {
    pub fn new(ctx: SchedulerContext) -> Self {
        Self { ctx }
    }

    /// Queues an event should land in under the current stage config.
    pub fn route(&self, event: &LibraryEvent) -> Vec<QueueKind> {
        let stages = self.ctx.config.stages();
        let item = event.item();
        let mut targets = Vec::new();

        match event {
            LibraryEvent::ItemAdded { .. } | LibraryEvent::ItemUpdated { .. } => {
                if stages.media_info {
                    targets.push(QueueKind::MediaInfo);
                }
                if matches!(event, LibraryEvent::ItemAdded { .. })
                    && item.is_episode()
                    && stages.fingerprint
                {
                    targets.push(QueueKind::Fingerprint);
                }
            }
            LibraryEvent::ItemFavorited { .. } => {
                if item.is_episode() && stages.episode_refresh {
                    targets.push(QueueKind::EpisodeRefresh);
                }
            }
        }
        targets
    }

    /// Enqueue the event's item everywhere it routes to.
    pub fn on_event(&self, event: LibraryEvent) -> Vec<QueueKind> {
        let targets = self.route(&event);
        let item = match event {
            LibraryEvent::ItemAdded { item }
            | LibraryEvent::ItemUpdated { item }
            | LibraryEvent::ItemFavorited { item } => item,
        };
        for kind in &targets {
            self.ctx.enqueue(*kind, item.clone());
        }
        if targets.is_empty() {
            tracing::trace!(item_id = %item.id, "Library event routed nowhere");
        }
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use sw_core::config::Config;
    use sw_core::{ItemId, Result, SeasonId, WorkOutcome};

    use crate::handler::{DispatchContext, Handlers, QueueHandler};

    struct Noop;

    #[async_trait]
    impl QueueHandler for Noop {
        async fn process(&self, _item: &WorkItem, _ctx: &DispatchContext) -> Result<WorkOutcome> {
            Ok(WorkOutcome::Completed)
        }
    }

    fn setup(config: &Config) -> (EnqueueHooks, SchedulerContext) {
        let (ctx, _) = SchedulerContext::in_memory(config, Handlers::uniform(Arc::new(Noop)));
        (EnqueueHooks::new(ctx.clone()), ctx)
    }

    fn episode() -> WorkItem {
        WorkItem::new(ItemId::new()).with_season(SeasonId::new())
    }

    #[test]
    fn added_episode_goes_to_media_info_and_fingerprint() {
        let (hooks, ctx) = setup(&Config::default());
        let targets = hooks.on_event(LibraryEvent::ItemAdded { item: episode() });
        assert_eq!(targets, vec![QueueKind::MediaInfo, QueueKind::Fingerprint]);
        assert_eq!(ctx.queue(QueueKind::Fingerprint).len(), 1);
    }

    #[test]
    fn updated_movie_only_refreshes_media_info() {
        let (hooks, _) = setup(&Config::default());
        let item = WorkItem::new(ItemId::new());
        assert_eq!(
            hooks.route(&LibraryEvent::ItemUpdated { item }),
            vec![QueueKind::MediaInfo]
        );
    }

    #[test]
    fn favorite_requires_episode_refresh_stage() {
        let (hooks, _) = setup(&Config::default());
        assert!(hooks
            .route(&LibraryEvent::ItemFavorited { item: episode() })
            .is_empty());

        let mut config = Config::default();
        config.stages.episode_refresh = true;
        let (hooks, ctx) = setup(&config);
        hooks.on_event(LibraryEvent::ItemFavorited { item: episode() });
        assert_eq!(ctx.queue(QueueKind::EpisodeRefresh).len(), 1);
    }

    #[test]
    fn disabled_stages_route_nowhere() {
        let mut config = Config::default();
        config.stages.media_info = false;
        config.stages.fingerprint = false;
        let (hooks, _) = setup(&config);
        assert!(hooks
            .on_event(LibraryEvent::ItemAdded { item: episode() })
            .is_empty());
    }
}
