//! Scheduler event system for progress reporting.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that late-joining observers (a status
//! page, the `simulate` command) can catch up.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ids::{ItemId, LibraryId, SeasonId};
use crate::work::QueueKind;

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // -- Worker lifecycle ----------------------------------------------------
    WorkerStarted {
        queue: QueueKind,
    },
    WorkerStopped {
        queue: QueueKind,
        /// `true` when the loop exited with work still pending.
        cancelled: bool,
    },

    // -- Cycle lifecycle -----------------------------------------------------
    CycleStarted {
        queue: QueueKind,
        batch: usize,
    },
    CycleCompleted {
        queue: QueueKind,
        dispatched: usize,
        deferred: usize,
        elapsed_ms: u64,
    },

    // -- Item lifecycle ------------------------------------------------------
    ItemQueued {
        queue: QueueKind,
        item_id: ItemId,
    },
    ItemDeferred {
        queue: QueueKind,
        item_id: ItemId,
        library_id: LibraryId,
    },
    ItemCompleted {
        queue: QueueKind,
        item_id: ItemId,
    },
    ItemSkipped {
        queue: QueueKind,
        item_id: ItemId,
    },
    ItemFailed {
        queue: QueueKind,
        item_id: ItemId,
        error: String,
    },
    ItemHandedOff {
        from: QueueKind,
        to: QueueKind,
        item_id: ItemId,
    },

    // -- Season barrier ------------------------------------------------------
    SeasonAggregated {
        season_id: SeasonId,
        episodes: usize,
    },
    SeasonSkipped {
        season_id: SeasonId,
    },
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn broadcast(&self, payload: EventPayload) {
        let event = Event::new(payload);

        // Store in ring buffer regardless of subscriber count.
        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // Ignore send errors (no subscribers).
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.tx.receiver_count())
            .field("recent", &self.recent.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let item_id = ItemId::new();
        bus.broadcast(EventPayload::ItemQueued {
            queue: QueueKind::MediaInfo,
            item_id,
        });

        let event = rx.try_recv().unwrap();
        match &event.payload {
            EventPayload::ItemQueued { item_id: received, .. } => assert_eq!(*received, item_id),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn recent_events_capped() {
        let bus = EventBus::new(256);
        for _ in 0..150 {
            bus.broadcast(EventPayload::WorkerStarted {
                queue: QueueKind::IntroSkip,
            });
        }
        assert_eq!(bus.recent_events(200).len(), MAX_RECENT_EVENTS);
    }

    #[test]
    fn recent_events_newest_first() {
        let bus = EventBus::new(16);
        for _ in 0..10 {
            bus.broadcast(EventPayload::CycleStarted {
                queue: QueueKind::Fingerprint,
                batch: 1,
            });
        }
        let season_id = SeasonId::new();
        bus.broadcast(EventPayload::SeasonSkipped { season_id });

        let recent = bus.recent_events(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].payload, EventPayload::SeasonSkipped { season_id });
    }

    #[test]
    fn no_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.broadcast(EventPayload::ItemFailed {
            queue: QueueKind::EpisodeRefresh,
            item_id: ItemId::new(),
            error: "test".into(),
        });
    }

    #[test]
    fn payload_is_tagged() {
        let payload = EventPayload::WorkerStopped {
            queue: QueueKind::MediaInfo,
            cancelled: true,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "worker_stopped");
        assert_eq!(json["queue"], "media_info");
    }
}
