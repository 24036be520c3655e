//! The work-item model shared by every queue.
//!
//! The scheduler never owns item semantics: a [`WorkItem`] is a reference to
//! a library item plus the few attributes scheduling needs (container for
//! admission, season for the barrier, ordering hints).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{ItemId, LibraryId, SeasonId};

// ---------------------------------------------------------------------------
// QueueKind
// ---------------------------------------------------------------------------

/// The four fixed work classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// Technical media info extraction (probe, chapters, thumbnails).
    MediaInfo,
    /// Per-episode audio fingerprinting, aggregated per season.
    Fingerprint,
    /// Intro/credits marker detection fed by completed media info.
    IntroSkip,
    /// Metadata-only episode refresh.
    EpisodeRefresh,
}

impl QueueKind {
    /// Every queue, in start-up order.
    pub const ALL: [QueueKind; 4] = [
        QueueKind::MediaInfo,
        QueueKind::Fingerprint,
        QueueKind::IntroSkip,
        QueueKind::EpisodeRefresh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MediaInfo => "media_info",
            Self::Fingerprint => "fingerprint",
            Self::IntroSkip => "intro_skip",
            Self::EpisodeRefresh => "episode_refresh",
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// WorkItem
// ---------------------------------------------------------------------------

/// A reference to one library item awaiting background work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Stable identity; drains de-duplicate on this.
    pub id: ItemId,
    /// Owning top-level library, consulted by admission.
    pub library_id: Option<LibraryId>,
    /// Season key for the fingerprint barrier. `None` for movies/extras.
    pub season_id: Option<SeasonId>,
    /// Extras (trailers, featurettes) are ordered after regular items.
    #[serde(default)]
    pub is_extra: bool,
    /// Premiere date, used for newest-first ordering.
    pub premiere: Option<DateTime<Utc>>,
    /// When a producer created this reference.
    pub enqueued_at: DateTime<Utc>,
}

impl WorkItem {
    /// Create a bare item reference with no container or season.
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            library_id: None,
            season_id: None,
            is_extra: false,
            premiere: None,
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_library(mut self, library_id: LibraryId) -> Self {
        self.library_id = Some(library_id);
        self
    }

    pub fn with_season(mut self, season_id: SeasonId) -> Self {
        self.season_id = Some(season_id);
        self
    }

    pub fn with_premiere(mut self, premiere: DateTime<Utc>) -> Self {
        self.premiere = Some(premiere);
        self
    }

    pub fn as_extra(mut self) -> Self {
        self.is_extra = true;
        self
    }

    /// Whether this item belongs to a season (i.e. is an episode).
    pub fn is_episode(&self) -> bool {
        self.season_id.is_some()
    }
}

// ---------------------------------------------------------------------------
// WorkOutcome / Reduction
// ---------------------------------------------------------------------------

/// Successful result of a unit of work.
///
/// Failures are reported as `Err(Error)` and cancellation as
/// `Err(Error::Cancelled)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOutcome {
    /// Finished; the permit may be released immediately.
    Completed,
    /// Finished after touching the shared transcoder; pace the next acquire
    /// by the configured cooldown when the primary budget is serialized.
    CompletedNeedsCooldown,
    /// Prerequisites are missing; nothing was done.
    Skipped,
}

impl WorkOutcome {
    pub fn needs_cooldown(&self) -> bool {
        matches!(self, Self::CompletedNeedsCooldown)
    }
}

/// The orchestrator's verdict on a drained batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reduction {
    /// Authoritative, ordered, de-duplicated candidates to dispatch.
    pub ready: Vec<WorkItem>,
    /// Items that cannot be handled by this queue yet and must be handed back
    /// to the media info queue.
    pub redirect: Vec<WorkItem>,
}

impl Reduction {
    pub fn ready(ready: Vec<WorkItem>) -> Self {
        Self {
            ready,
            redirect: Vec::new(),
        }
    }
}
