//! Per-item dispatch scopes.
//!
//! Which exclusive behaviors apply to an item (probe only, fingerprint only,
//! metadata only, ...) is carried as an explicit [`ItemScope`] value. The
//! registry exposes the scopes of in-flight dispatches to other code paths
//! that only see an item id; entries live exactly as long as their
//! [`ScopeGuard`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use sw_core::{ItemId, QueueKind};

/// Behaviors a dispatch is allowed to perform on its item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExclusiveFlags {
    pub probe: bool,
    pub thumbnails: bool,
    pub intro_fingerprint: bool,
    pub credits_fingerprint: bool,
    pub metadata_only: bool,
}

impl ExclusiveFlags {
    pub fn for_queue(kind: QueueKind) -> Self {
        match kind {
            QueueKind::MediaInfo => Self {
                probe: true,
                thumbnails: true,
                ..Self::default()
            },
            QueueKind::Fingerprint => Self {
                intro_fingerprint: true,
                credits_fingerprint: true,
                ..Self::default()
            },
            QueueKind::IntroSkip => Self {
                intro_fingerprint: true,
                ..Self::default()
            },
            QueueKind::EpisodeRefresh => Self {
                metadata_only: true,
                ..Self::default()
            },
        }
    }
}

/// Context attached to one dispatch of one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemScope {
    pub item_id: ItemId,
    pub queue: QueueKind,
    pub flags: ExclusiveFlags,
    pub dispatched_at: DateTime<Utc>,
}

impl ItemScope {
    pub fn new(item_id: ItemId, queue: QueueKind) -> Self {
        Self {
            item_id,
            queue,
            flags: ExclusiveFlags::for_queue(queue),
            dispatched_at: Utc::now(),
        }
    }
}

/// Concurrent registry of in-flight item scopes.
///
/// Keyed by `(item, queue)` because the same item may be in flight on two
/// queues at once (e.g. media info and fingerprint).
#[derive(Debug, Default)]
pub struct ItemScopes {
    scopes: DashMap<(ItemId, QueueKind), ItemScope>,
}

impl ItemScopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `scope` until the returned guard is dropped.
    pub fn enter(self: &Arc<Self>, scope: ItemScope) -> ScopeGuard {
        let key = (scope.item_id, scope.queue);
        self.scopes.insert(key, scope);
        ScopeGuard {
            registry: self.clone(),
            key,
        }
    }

    pub fn get(&self, item_id: ItemId, queue: QueueKind) -> Option<ItemScope> {
        self.scopes.get(&(item_id, queue)).map(|s| s.clone())
    }

    /// Every scope currently registered for `item_id`.
    pub fn active_for(&self, item_id: ItemId) -> Vec<ItemScope> {
        self.scopes
            .iter()
            .filter(|entry| entry.key().0 == item_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

/// Removes its scope from the registry on drop, including on panic unwind.
#[derive(Debug)]
pub struct ScopeGuard {
    registry: Arc<ItemScopes>,
    key: (ItemId, QueueKind),
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.registry.scopes.remove(&self.key);
    }
}
