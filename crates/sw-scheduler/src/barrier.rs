//! Season barrier: fan out per-episode work, join per season.
//!
//! Every fingerprint candidate carrying a season key is registered before
//! any dispatch starts, so each group knows its full size up front. As
//! episodes settle the group counts down; when it reaches zero the barrier
//! yields a verdict: aggregate, or skip if any episode could not supply its
//! prerequisites.

use std::collections::HashMap;

use sw_core::{SeasonId, WorkItem};

/// What to do with a season whose episodes have all settled.
#[derive(Debug, Clone, PartialEq)]
pub enum SeasonVerdict {
    /// Every episode settled without a skip; run the aggregation.
    Aggregate {
        season_id: SeasonId,
        episodes: Vec<WorkItem>,
    },
    /// At least one episode skipped (or was never dispatched); retry in a
    /// later cycle.
    Skip { season_id: SeasonId },
}

#[derive(Debug)]
struct SeasonGroup {
    episodes: Vec<WorkItem>,
    pending: usize,
    blocked: bool,
}

/// Wait-group keyed by season, valid for one cycle.
#[derive(Debug, Default)]
pub struct SeasonBarrier {
    groups: HashMap<SeasonId, SeasonGroup>,
}

impl SeasonBarrier {
    /// Register every seasonal candidate of the cycle.
    pub fn from_candidates(candidates: &[WorkItem]) -> Self {
        let mut groups: HashMap<SeasonId, SeasonGroup> = HashMap::new();
        for item in candidates {
            let Some(season_id) = item.season_id else {
                continue;
            };
            let group = groups.entry(season_id).or_insert_with(|| SeasonGroup {
                episodes: Vec::new(),
                pending: 0,
                blocked: false,
            });
            group.episodes.push(item.clone());
            group.pending += 1;
        }
        Self { groups }
    }

    /// Record that one episode settled.
    ///
    /// `blocks` is true when the episode signalled a skip (or was cancelled).
    /// Returns the season verdict when this was the last pending episode.
    pub fn settle(&mut self, item: &WorkItem, blocks: bool) -> Option<SeasonVerdict> {
        let season_id = item.season_id?;
        let group = self.groups.get_mut(&season_id)?;
        group.pending = group.pending.saturating_sub(1);
        group.blocked |= blocks;
        if group.pending > 0 {
            return None;
        }

        let group = self.groups.remove(&season_id)?;
        Some(if group.blocked {
            SeasonVerdict::Skip { season_id }
        } else {
            SeasonVerdict::Aggregate {
                season_id,
                episodes: group.episodes,
            }
        })
    }

    /// Record that an episode will never be dispatched this cycle.
    pub fn abandon(&mut self, item: &WorkItem) -> Option<SeasonVerdict> {
        self.settle(item, true)
    }

    /// Seasons still waiting on at least one episode.
    pub fn open_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Close the barrier, returning seasons that never completed.
    pub fn into_open(self) -> Vec<SeasonId> {
        self.groups.into_keys().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sw_core::ItemId;

    fn episodes(season: SeasonId, n: usize) -> Vec<WorkItem> {
        (0..n)
            .map(|_| WorkItem::new(ItemId::new()).with_season(season))
            .collect()
    }

    #[test]
    fn aggregate_after_last_episode() {
        let season = SeasonId::new();
        let eps = episodes(season, 3);
        let mut barrier = SeasonBarrier::from_candidates(&eps);
        assert_eq!(barrier.open_groups(), 1);

        assert!(barrier.settle(&eps[0], false).is_none());
        assert!(barrier.settle(&eps[2], false).is_none());
        let verdict = barrier.settle(&eps[1], false).unwrap();
        assert_eq!(
            verdict,
            SeasonVerdict::Aggregate {
                season_id: season,
                episodes: eps.clone()
            }
        );
        assert!(barrier.is_empty());
    }

    #[test]
    fn any_skip_blocks_aggregation() {
        let season = SeasonId::new();
        let eps = episodes(season, 5);
        let mut barrier = SeasonBarrier::from_candidates(&eps);

        let mut verdicts = Vec::new();
        for (i, ep) in eps.iter().enumerate() {
            verdicts.extend(barrier.settle(ep, i == 2));
        }
        assert_eq!(verdicts, vec![SeasonVerdict::Skip { season_id: season }]);
    }

    #[test]
    fn abandoned_episode_skips_season() {
        let season = SeasonId::new();
        let eps = episodes(season, 2);
        let mut barrier = SeasonBarrier::from_candidates(&eps);
        assert!(barrier.settle(&eps[0], false).is_none());
        assert_eq!(
            barrier.abandon(&eps[1]),
            Some(SeasonVerdict::Skip { season_id: season })
        );
    }

    #[test]
    fn seasons_are_independent() {
        let s1 = SeasonId::new();
        let s2 = SeasonId::new();
        let a = episodes(s1, 2);
        let b = episodes(s2, 1);
        let all: Vec<_> = a.iter().chain(b.iter()).cloned().collect();
        let mut barrier = SeasonBarrier::from_candidates(&all);
        assert_eq!(barrier.open_groups(), 2);

        assert!(matches!(
            barrier.settle(&b[0], false),
            Some(SeasonVerdict::Aggregate { season_id, .. }) if season_id == s2
        ));
        assert!(barrier.settle(&a[0], true).is_none());
        assert_eq!(
            barrier.settle(&a[1], false),
            Some(SeasonVerdict::Skip { season_id: s1 })
        );
    }

    #[test]
    fn items_without_season_are_ignored() {
        let movie = WorkItem::new(ItemId::new());
        let mut barrier = SeasonBarrier::from_candidates(std::slice::from_ref(&movie));
        assert!(barrier.is_empty());
        assert!(barrier.settle(&movie, true).is_none());
    }
}
