// Lucky-loser queue ordering, prefix repair and vacancy candidate selection.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Sort key for ranked lists: best ranking first, unranked last, then the
/// stable identifier.
pub fn ranking_key(world_ranking: Option<u32>, id: i64) -> (bool, u32, i64) {
    (world_ranking.is_none(), world_ranking.unwrap_or(u32::MAX), id)
}

/// A lucky loser or alternate as seen by the roster rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterCandidate {
    pub id: i64,
    pub world_ranking: Option<u32>,
    /// Main-draw slot currently held, if any.
    pub position: Option<u32>,
}

impl RosterCandidate {
    pub fn is_placed(&self) -> bool {
        self.position.is_some()
    }
}

/// Order candidates by queue priority.
pub fn queue_order(candidates: &[RosterCandidate]) -> Vec<RosterCandidate> {
    let mut ordered = candidates.to_vec();
    ordered.sort_by_key(|c| ranking_key(c.world_ranking, c.id));
    ordered
}

/// One eviction needed to restore the lucky-loser prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRepair {
    /// Placed lucky loser outside the prefix; loses its slot.
    pub evicted: i64,
    /// Best prefix member not yet placed; takes over the slot.
    pub replacement: i64,
    pub slot: u32,
}

/// Evictions that make the placed lucky losers equal the first `k` of the
/// queue, where `k` is how many are placed now.
///
/// Outsiders are handled best-first and each hands its exact slot to the
/// highest-priority missing prefix member.
pub fn plan_prefix_repairs(lucky_losers: &[RosterCandidate]) -> Vec<PrefixRepair> {
    let queue = queue_order(lucky_losers);
    let placed = queue.iter().filter(|c| c.is_placed()).count();
    let prefix: HashSet<i64> = queue.iter().take(placed).map(|c| c.id).collect();

    let outsiders = queue
        .iter()
        .filter(|c| c.is_placed() && !prefix.contains(&c.id));
    let missing = queue
        .iter()
        .take(placed)
        .filter(|c| !c.is_placed());

    outsiders
        .zip(missing)
        .filter_map(|(out, inn)| {
            out.position.map(|slot| PrefixRepair {
                evicted: out.id,
                replacement: inn.id,
                slot,
            })
        })
        .collect()
}

/// Where a vacancy filler came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillSource {
    LuckyLoser,
    Alternate,
}

/// Pick who fills a vacancy: the first unplaced lucky loser in queue order,
/// otherwise the first unplaced alternate by ranking.
pub fn pick_vacancy_filler(
    lucky_losers: &[RosterCandidate],
    alternates: &[RosterCandidate],
) -> Option<(i64, FillSource)> {
    queue_order(lucky_losers)
        .into_iter()
        .find(|c| !c.is_placed())
        .map(|c| (c.id, FillSource::LuckyLoser))
        .or_else(|| {
            queue_order(alternates)
                .into_iter()
                .find(|c| !c.is_placed())
                .map(|c| (c.id, FillSource::Alternate))
        })
}

/// The placed lucky loser with the lowest queue priority.
pub fn worst_placed(lucky_losers: &[RosterCandidate]) -> Option<RosterCandidate> {
    queue_order(lucky_losers)
        .into_iter()
        .rev()
        .find(|c| c.is_placed())
}

/// Whether the placed lucky losers are exactly a prefix of the queue.
pub fn is_prefix_placed(lucky_losers: &[RosterCandidate]) -> bool {
    let queue = queue_order(lucky_losers);
    let placed = queue.iter().filter(|c| c.is_placed()).count();
    queue.iter().take(placed).all(|c| c.is_placed())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ll(id: i64, ranking: Option<u32>, position: Option<u32>) -> RosterCandidate {
        RosterCandidate {
            id,
            world_ranking: ranking,
            position,
        }
    }

    #[test]
    fn unranked_sorts_last_and_ids_break_ties() {
        let queue = queue_order(&[
            ll(1, None, None),
            ll(2, Some(40), None),
            ll(3, Some(12), None),
            ll(4, Some(12), None),
        ]);
        let ids: Vec<i64> = queue.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 4, 2, 1]);
    }

    #[test]
    fn repairs_swap_outsiders_for_missing_prefix_members() {
        // Queue: 10 (r5), 11 (r8), 12 (r9), 13 (r20). Placed: 11 and 13.
        let lls = [
            ll(10, Some(5), None),
            ll(11, Some(8), Some(7)),
            ll(12, Some(9), None),
            ll(13, Some(20), Some(22)),
        ];
        let repairs = plan_prefix_repairs(&lls);
        assert_eq!(
            repairs,
            vec![PrefixRepair {
                evicted: 13,
                replacement: 10,
                slot: 22
            }]
        );
    }

    #[test]
    fn repaired_state_is_a_prefix_for_any_perturbation() {
        let base: Vec<RosterCandidate> = (0..6)
            .map(|i| ll(i + 1, Some((i as u32 + 1) * 3), None))
            .collect();

        // Every subset of placed lucky losers.
        for mask in 0u32..(1 << base.len()) {
            let mut lls = base.clone();
            for (i, c) in lls.iter_mut().enumerate() {
                if mask & (1 << i) != 0 {
                    c.position = Some(100 + i as u32);
                }
            }

            for repair in plan_prefix_repairs(&lls) {
                for c in lls.iter_mut() {
                    if c.id == repair.evicted {
                        c.position = None;
                    } else if c.id == repair.replacement {
                        c.position = Some(repair.slot);
                    }
                }
            }

            assert!(is_prefix_placed(&lls), "mask {mask:06b}");
            assert_eq!(
                lls.iter().filter(|c| c.is_placed()).count(),
                mask.count_ones() as usize
            );
        }
    }

    #[test]
    fn prefix_state_needs_no_repairs() {
        let lls = [ll(1, Some(1), Some(3)), ll(2, Some(2), None)];
        assert!(plan_prefix_repairs(&lls).is_empty());
        assert!(plan_prefix_repairs(&[]).is_empty());
    }

    #[test]
    fn vacancy_prefers_lucky_losers_then_alternates() {
        let lls = [ll(1, Some(3), Some(4)), ll(2, Some(9), None)];
        let alts = [ll(5, Some(1), None)];
        assert_eq!(
            pick_vacancy_filler(&lls, &alts),
            Some((2, FillSource::LuckyLoser))
        );

        let lls = [ll(1, Some(3), Some(4))];
        assert_eq!(
            pick_vacancy_filler(&lls, &alts),
            Some((5, FillSource::Alternate))
        );

        assert_eq!(pick_vacancy_filler(&lls, &[]), None);
    }

    #[test]
    fn worst_placed_is_last_in_queue() {
        let lls = [
            ll(1, Some(3), Some(4)),
            ll(2, Some(9), Some(10)),
            ll(3, None, None),
        ];
        assert_eq!(worst_placed(&lls).map(|c| c.id), Some(2));
        assert_eq!(worst_placed(&[ll(3, None, None)]), None);
    }
}
