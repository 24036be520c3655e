//! Cross-queue handoff.
//!
//! Completed media info flows on into intro skip when that stage is enabled;
//! fingerprint candidates that still lack media info are handed back to the
//! media info queue instead of being dropped.

use sw_core::config::StageConfig;
use sw_core::events::EventPayload;
use sw_core::{QueueKind, WorkItem};

use crate::context::SchedulerContext;

/// Forward a successfully processed item downstream, if eligible.
///
/// Returns `true` when the item was pushed into the intro skip queue.
pub fn forward_completed(
    ctx: &SchedulerContext,
    from: QueueKind,
    item: &WorkItem,
    stages: &StageConfig,
) -> bool {
    if from != QueueKind::MediaInfo || !stages.intro_skip {
        return false;
    }
    if !ctx.handlers.get(from).forward_to_intro_skip(item) {
        return false;
    }

    ctx.enqueue(QueueKind::IntroSkip, item.clone());
    ctx.events.broadcast(EventPayload::ItemHandedOff {
        from,
        to: QueueKind::IntroSkip,
        item_id: item.id,
    });
    tracing::debug!(item_id = %item.id, "Handed off to intro skip");
    true
}

/// Push items the `from` queue cannot handle yet into the media info queue.
pub fn redirect_to_media_info(
    ctx: &SchedulerContext,
    from: QueueKind,
    items: Vec<WorkItem>,
) -> usize {
    let count = items.len();
    for item in items {
        let item_id = item.id;
        ctx.enqueue(QueueKind::MediaInfo, item);
        ctx.events.broadcast(EventPayload::ItemHandedOff {
            from,
            to: QueueKind::MediaInfo,
            item_id,
        });
    }
    if count > 0 {
        tracing::info!(queue = %from, count, "Redirected items to media info");
    }
    count
}
