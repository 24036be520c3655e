//! Unbounded multi-producer work queues.
//!
//! Producers append from any task; the queue's single worker drains the
//! whole content at once. Anything that arrives after a drain is simply
//! picked up by the next cycle.

use std::collections::VecDeque;

use parking_lot::Mutex;

use sw_core::{QueueKind, WorkItem};

/// FIFO of pending item references for one work class.
#[derive(Debug)]
pub struct WorkQueue {
    kind: QueueKind,
    items: Mutex<VecDeque<WorkItem>>,
}

impl WorkQueue {
    pub fn new(kind: QueueKind) -> Self {
        Self {
            kind,
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Append one item at the tail.
    pub fn enqueue(&self, item: WorkItem) {
        self.items.lock().push_back(item);
    }

    /// Append several items at the tail, preserving their order.
    pub fn enqueue_many(&self, items: impl IntoIterator<Item = WorkItem>) -> usize {
        let mut queue = self.items.lock();
        let before = queue.len();
        queue.extend(items);
        queue.len() - before
    }

    /// Atomically take everything currently queued.
    pub fn drain(&self) -> Vec<WorkItem> {
        let mut queue = self.items.lock();
        std::mem::take(&mut *queue).into()
    }

    /// Drop all pending items, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut queue = self.items.lock();
        let n = queue.len();
        queue.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

/// The four queues, addressable by [`QueueKind`].
#[derive(Debug)]
pub struct WorkQueues {
    media_info: WorkQueue,
    fingerprint: WorkQueue,
    intro_skip: WorkQueue,
    episode_refresh: WorkQueue,
}

impl WorkQueues {
    pub fn new() -> Self {
        Self {
            media_info: WorkQueue::new(QueueKind::MediaInfo),
            fingerprint: WorkQueue::new(QueueKind::Fingerprint),
            intro_skip: WorkQueue::new(QueueKind::IntroSkip),
            episode_refresh: WorkQueue::new(QueueKind::EpisodeRefresh),
        }
    }

    pub fn get(&self, kind: QueueKind) -> &WorkQueue {
        match kind {
            QueueKind::MediaInfo => &self.media_info,
            QueueKind::Fingerprint => &self.fingerprint,
            QueueKind::IntroSkip => &self.intro_skip,
            QueueKind::EpisodeRefresh => &self.episode_refresh,
        }
    }
}

impl Default for WorkQueues {
    fn default() -> Self {
        Self::new()
    }
}
