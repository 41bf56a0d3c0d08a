// Capacity classification of registrations into seed / direct / qualifier / reserve.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BracketError;
use crate::roster::ranking_key;

/// Outcome group of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryGroup {
    Seed,
    DirectAccept,
    Qualifier,
    Reserve,
}

impl EntryGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryGroup::Seed => "SEED",
            EntryGroup::DirectAccept => "DIRECT_ACCEPT",
            EntryGroup::Qualifier => "QUALIFIER",
            EntryGroup::Reserve => "RESERVE",
        }
    }
}

impl fmt::Display for EntryGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guaranteed placement granted by a wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Promotion {
    None,
    /// Main-draw wildcard: always Seed or DirectAccept.
    MainDraw,
    /// Qualifying wildcard: at least Qualifier.
    Qualifying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerCandidate {
    pub entry_id: i64,
    pub world_ranking: Option<u32>,
    pub promotion: Promotion,
}

/// Capacities the classification has to respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerLimits {
    pub seeds: usize,
    /// Main-draw places not reserved for qualifiers.
    pub direct_accept: usize,
    /// Places in the qualification brackets.
    pub qualifier: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub entry_id: i64,
    pub group: EntryGroup,
    pub seed_number: Option<u32>,
    /// Dense 1..N order across all groups.
    pub registration_rank: u32,
}

/// Classify every candidate by ranking under `limits`.
///
/// Promoted entries displace the worst-ranked non-promoted entries of the
/// group they are guaranteed. Among equal rankings the higher entry id is
/// displaced first. More promoted entries than a group holds is an error.
pub fn classify(
    candidates: &[PlannerCandidate],
    limits: PlannerLimits,
) -> Result<Vec<Placement>, BracketError> {
    let mut ordered = candidates.to_vec();
    ordered.sort_by_key(|c| ranking_key(c.world_ranking, c.entry_id));

    let main_draw = take_group(&ordered, Promotion::MainDraw, limits.direct_accept, "main-draw")?;
    let rest: Vec<PlannerCandidate> = ordered
        .iter()
        .filter(|c| !main_draw.contains(&c.entry_id))
        .copied()
        .collect();
    let qualifying = take_group(&rest, Promotion::Qualifying, limits.qualifier, "qualifying")?;

    let mut placements = Vec::with_capacity(ordered.len());
    let mut rank = 0u32;
    let mut push = |entry_id: i64, group: EntryGroup, seed_number: Option<u32>| {
        rank += 1;
        placements.push(Placement {
            entry_id,
            group,
            seed_number,
            registration_rank: rank,
        });
    };

    let mut seeds = 0usize;
    for c in ordered.iter().filter(|c| main_draw.contains(&c.entry_id)) {
        if seeds < limits.seeds {
            seeds += 1;
            push(c.entry_id, EntryGroup::Seed, Some(seeds as u32));
        }
    }
    for c in ordered.iter().filter(|c| main_draw.contains(&c.entry_id)).skip(seeds) {
        push(c.entry_id, EntryGroup::DirectAccept, None);
    }
    for c in rest.iter().filter(|c| qualifying.contains(&c.entry_id)) {
        push(c.entry_id, EntryGroup::Qualifier, None);
    }
    for c in rest.iter().filter(|c| !qualifying.contains(&c.entry_id)) {
        push(c.entry_id, EntryGroup::Reserve, None);
    }

    Ok(placements)
}

/// Ids of the entries that make a group of `capacity`: every entry with
/// `promotion`, then the best of the others.
fn take_group(
    ordered: &[PlannerCandidate],
    promotion: Promotion,
    capacity: usize,
    group: &'static str,
) -> Result<HashSet<i64>, BracketError> {
    let promoted: HashSet<i64> = ordered
        .iter()
        .filter(|c| c.promotion == promotion)
        .map(|c| c.entry_id)
        .collect();
    if promoted.len() > capacity {
        return Err(BracketError::PromotionOverflow {
            group,
            promoted: promoted.len(),
            capacity,
        });
    }

    let open = capacity - promoted.len();
    let mut members = promoted;
    members.extend(
        ordered
            .iter()
            .filter(|c| c.promotion != promotion)
            .take(open)
            .map(|c| c.entry_id),
    );
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(entry_id: i64, ranking: Option<u32>, promotion: Promotion) -> PlannerCandidate {
        PlannerCandidate {
            entry_id,
            world_ranking: ranking,
            promotion,
        }
    }

    fn groups(placements: &[Placement]) -> Vec<(i64, EntryGroup)> {
        placements.iter().map(|p| (p.entry_id, p.group)).collect()
    }

    #[test]
    fn classifies_by_ranking() {
        let candidates: Vec<PlannerCandidate> = (1..=10)
            .map(|i| cand(i, Some(i as u32), Promotion::None))
            .collect();
        let limits = PlannerLimits {
            seeds: 2,
            direct_accept: 4,
            qualifier: 4,
        };
        let placements = classify(&candidates, limits).unwrap();
        assert_eq!(
            groups(&placements),
            vec![
                (1, EntryGroup::Seed),
                (2, EntryGroup::Seed),
                (3, EntryGroup::DirectAccept),
                (4, EntryGroup::DirectAccept),
                (5, EntryGroup::Qualifier),
                (6, EntryGroup::Qualifier),
                (7, EntryGroup::Qualifier),
                (8, EntryGroup::Qualifier),
                (9, EntryGroup::Reserve),
                (10, EntryGroup::Reserve),
            ]
        );
        let ranks: Vec<u32> = placements.iter().map(|p| p.registration_rank).collect();
        assert_eq!(ranks, (1..=10).collect::<Vec<_>>());
        assert_eq!(placements[1].seed_number, Some(2));
        assert_eq!(placements[2].seed_number, None);
    }

    #[test]
    fn wildcard_displaces_worst_direct_accept() {
        let mut candidates: Vec<PlannerCandidate> = (1..=5)
            .map(|i| cand(i, Some(i as u32), Promotion::None))
            .collect();
        candidates.push(cand(6, Some(300), Promotion::MainDraw));

        let limits = PlannerLimits {
            seeds: 0,
            direct_accept: 4,
            qualifier: 2,
        };
        let placements = classify(&candidates, limits).unwrap();
        let group_of = |id: i64| placements.iter().find(|p| p.entry_id == id).unwrap().group;

        assert_eq!(group_of(6), EntryGroup::DirectAccept);
        assert_eq!(group_of(3), EntryGroup::DirectAccept);
        assert_eq!(group_of(4), EntryGroup::Qualifier);
        assert_eq!(group_of(5), EntryGroup::Qualifier);
    }

    #[test]
    fn equal_rankings_demote_the_higher_id() {
        let candidates = vec![
            cand(1, Some(1), Promotion::None),
            cand(3, Some(7), Promotion::None),
            cand(2, Some(7), Promotion::None),
            cand(9, None, Promotion::MainDraw),
        ];
        let limits = PlannerLimits {
            seeds: 0,
            direct_accept: 3,
            qualifier: 0,
        };
        let placements = classify(&candidates, limits).unwrap();
        let reserve: Vec<i64> = placements
            .iter()
            .filter(|p| p.group == EntryGroup::Reserve)
            .map(|p| p.entry_id)
            .collect();
        assert_eq!(reserve, vec![3]);
    }

    #[test]
    fn qualifying_wildcard_keeps_a_qualifier_place() {
        let candidates = vec![
            cand(1, Some(1), Promotion::None),
            cand(2, Some(2), Promotion::None),
            cand(3, Some(3), Promotion::None),
            cand(4, None, Promotion::Qualifying),
        ];
        let limits = PlannerLimits {
            seeds: 0,
            direct_accept: 1,
            qualifier: 2,
        };
        let placements = classify(&candidates, limits).unwrap();
        assert_eq!(
            groups(&placements),
            vec![
                (1, EntryGroup::DirectAccept),
                (2, EntryGroup::Qualifier),
                (4, EntryGroup::Qualifier),
                (3, EntryGroup::Reserve),
            ]
        );
    }

    #[test]
    fn too_many_wildcards_is_an_error() {
        let candidates = vec![
            cand(1, None, Promotion::MainDraw),
            cand(2, None, Promotion::MainDraw),
        ];
        let limits = PlannerLimits {
            seeds: 0,
            direct_accept: 1,
            qualifier: 0,
        };
        assert_eq!(
            classify(&candidates, limits),
            Err(BracketError::PromotionOverflow {
                group: "main-draw",
                promoted: 2,
                capacity: 1
            })
        );
    }

    #[test]
    fn wildcards_can_be_seeded_by_ranking() {
        let candidates = vec![
            cand(1, Some(1), Promotion::MainDraw),
            cand(2, Some(2), Promotion::None),
            cand(3, Some(3), Promotion::None),
        ];
        let limits = PlannerLimits {
            seeds: 1,
            direct_accept: 2,
            qualifier: 0,
        };
        let placements = classify(&candidates, limits).unwrap();
        assert_eq!(placements[0].entry_id, 1);
        assert_eq!(placements[0].group, EntryGroup::Seed);
        assert_eq!(placements[0].seed_number, Some(1));
    }
}
