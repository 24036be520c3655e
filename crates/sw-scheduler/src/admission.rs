//! Admission control for drained batches.
//!
//! A small trickle of work that lands in a library which is still being
//! scanned is pushed back to the queue; a backlog at least as large as the
//! budget is always let through so the queue keeps moving.

use std::collections::HashSet;

use dashmap::DashMap;

use sw_core::{LibraryId, WorkItem};

/// Source of truth for "is this library mid-scan?".
pub trait ScanProbe: Send + Sync {
    /// Scan/refresh progress (0..100) for an active scan, `None` when idle.
    fn scan_progress(&self, library_id: LibraryId) -> Option<f64>;

    fn is_scanning(&self, library_id: LibraryId) -> bool {
        self.scan_progress(library_id).is_some()
    }
}

/// In-memory tracker of running library scans.
#[derive(Debug, Default)]
pub struct ActiveScans {
    scans: DashMap<LibraryId, f64>,
}

impl ActiveScans {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a library as scanning from 0%.
    pub fn begin(&self, library_id: LibraryId) {
        self.scans.insert(library_id, 0.0);
        tracing::debug!(library_id = %library_id, "Library scan started");
    }

    pub fn progress(&self, library_id: LibraryId, percent: f64) {
        if let Some(mut entry) = self.scans.get_mut(&library_id) {
            *entry = percent.clamp(0.0, 100.0);
        }
    }

    pub fn finish(&self, library_id: LibraryId) {
        if self.scans.remove(&library_id).is_some() {
            tracing::debug!(library_id = %library_id, "Library scan finished");
        }
    }

    pub fn active(&self) -> usize {
        self.scans.len()
    }
}

impl ScanProbe for ActiveScans {
    fn scan_progress(&self, library_id: LibraryId) -> Option<f64> {
        self.scans.get(&library_id).map(|p| *p)
    }
}

/// A batch split into work to dispatch now and work to retry later.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Admission {
    pub ready: Vec<WorkItem>,
    pub deferred: Vec<WorkItem>,
}

/// Remove repeated item ids, keeping the first occurrence.
pub fn dedup_by_id(batch: Vec<WorkItem>) -> Vec<WorkItem> {
    let mut seen = HashSet::with_capacity(batch.len());
    batch.into_iter().filter(|item| seen.insert(item.id)).collect()
}

/// Partition a freshly drained batch.
///
/// `capacity` is the configured primary capacity read at cycle start. Items
/// are deferred only when the raw (pre-dedup) batch is smaller than the
/// capacity and their library reports an active scan.
pub fn admit(batch: Vec<WorkItem>, capacity: usize, scans: &dyn ScanProbe) -> Admission {
    let pre_drain = batch.len();
    let batch = dedup_by_id(batch);

    if pre_drain >= capacity {
        return Admission {
            ready: batch,
            deferred: Vec::new(),
        };
    }

    let (deferred, ready): (Vec<_>, Vec<_>) = batch.into_iter().partition(|item| {
        item.library_id
            .is_some_and(|library_id| scans.is_scanning(library_id))
    });
    Admission { ready, deferred }
}
