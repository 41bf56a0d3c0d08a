// Qualification brackets: tiered anchor seeds spread across K brackets.

use std::collections::{BTreeSet, HashSet};
use std::fmt::{self, Debug};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::anchors::anchor_order;
use crate::error::BracketError;
use crate::mapper::{verify_bijection, SlotMap};
use crate::shuffle::deterministic_shuffle;

/// Anchor tier inside one qualification bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualTier {
    Top,
    Bottom,
    MiddleA,
    MiddleB,
}

impl QualTier {
    /// Position of this tier in the bracket's anchor order.
    fn anchor_index(self) -> usize {
        match self {
            QualTier::Top => 0,
            QualTier::Bottom => 1,
            QualTier::MiddleA => 2,
            QualTier::MiddleB => 3,
        }
    }

    /// Local slot of this tier in a bracket of `size` slots.
    pub fn local_slot(self, size: u32) -> Result<u32, BracketError> {
        anchor_order(size)?
            .get(self.anchor_index())
            .copied()
            .ok_or_else(|| BracketError::QualificationShape(format!("no {self} tier in a {size}-slot bracket")))
    }
}

impl fmt::Display for QualTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QualTier::Top => "TOP",
            QualTier::Bottom => "BOTTOM",
            QualTier::MiddleA => "MIDDLE_A",
            QualTier::MiddleB => "MIDDLE_B",
        };
        f.write_str(label)
    }
}

/// Anchor tiers used by brackets of `rounds` rounds, in fill order.
pub fn tiers_for_rounds(rounds: u32) -> Result<Vec<QualTier>, BracketError> {
    match rounds {
        1 => Ok(vec![]),
        2 => Ok(vec![QualTier::Top]),
        3 => Ok(vec![QualTier::Top, QualTier::Bottom]),
        4 => Ok(vec![
            QualTier::Top,
            QualTier::Bottom,
            QualTier::MiddleA,
            QualTier::MiddleB,
        ]),
        r => Err(BracketError::QualificationShape(format!(
            "{r} qualifying rounds (supported: 1-4)"
        ))),
    }
}

/// Local slots of one bracket with `rounds` rounds. Rejects shapes outside
/// the tier table before any shifting happens.
pub fn qualification_bracket_size(rounds: u32) -> Result<u32, BracketError> {
    tiers_for_rounds(rounds)?;
    Ok(1u32 << rounds)
}

/// Number of seeded qualifiers across `brackets` brackets of `rounds` rounds.
pub fn seed_pool_size(brackets: usize, rounds: u32) -> usize {
    if rounds < 2 {
        0
    } else {
        brackets * (1usize << (rounds - 2))
    }
}

/// Build `brackets` independent qualification brackets of `2^rounds`
/// local slots each.
///
/// The globally ordered `seed_pool` is cut into chunks of `brackets`
/// entries; chunk `i` fills tier `i` of brackets `0..brackets`, so the best
/// seeds are spread one per bracket. Every other slot, walking brackets in
/// order and local slots ascending, takes the next entry of one shared
/// shuffle of `unseeded`.
pub fn build_qualification_brackets<T>(
    brackets: usize,
    rounds: u32,
    seed_pool: &[T],
    unseeded: &[T],
    rng_seed: u64,
) -> Result<Vec<SlotMap<T>>, BracketError>
where
    T: Clone + Eq + Hash + Debug,
{
    if brackets == 0 {
        return Ok(vec![]);
    }
    let tiers = tiers_for_rounds(rounds)?;
    let size = qualification_bracket_size(rounds)?;

    let pool_size = seed_pool_size(brackets, rounds);
    if seed_pool.len() < pool_size {
        return Err(BracketError::CountMismatch {
            needed: pool_size,
            available: seed_pool.len(),
        });
    }

    let mut maps: Vec<SlotMap<T>> = vec![SlotMap::new(); brackets];
    for (tier, chunk) in tiers.iter().zip(seed_pool[..pool_size].chunks(brackets)) {
        let slot = tier.local_slot(size)?;
        for (map, entry) in maps.iter_mut().zip(chunk) {
            map.insert(slot, entry.clone());
        }
    }

    let open_total = brackets * size as usize - pool_size;
    if unseeded.len() < open_total {
        return Err(BracketError::CountMismatch {
            needed: open_total,
            available: unseeded.len(),
        });
    }

    let mut shuffled = deterministic_shuffle(unseeded, rng_seed).into_iter();
    for map in maps.iter_mut() {
        for slot in 1..=size {
            if map.contains_key(&slot) {
                continue;
            }
            if let Some(entry) = shuffled.next() {
                map.insert(slot, entry);
            }
        }
    }

    let mut seen = HashSet::new();
    for (index, map) in maps.iter().enumerate() {
        verify_bijection(map, size, &BTreeSet::new())?;
        if let Some(dup) = map.values().find(|e| !seen.insert(*e)) {
            return Err(BracketError::BrokenMapping(format!(
                "{dup:?} appears in more than one bracket (again in bracket {index})"
            )));
        }
    }
    Ok(maps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_slots_follow_the_anchor_map() {
        assert_eq!(QualTier::Top.local_slot(4).unwrap(), 1);
        assert_eq!(QualTier::Bottom.local_slot(8).unwrap(), 8);
        assert_eq!(QualTier::MiddleA.local_slot(16).unwrap(), 9);
        assert_eq!(QualTier::MiddleB.local_slot(16).unwrap(), 8);
    }

    #[test]
    fn tier_table_by_rounds() {
        assert!(tiers_for_rounds(1).unwrap().is_empty());
        assert_eq!(tiers_for_rounds(2).unwrap(), vec![QualTier::Top]);
        assert_eq!(tiers_for_rounds(3).unwrap().len(), 2);
        assert_eq!(tiers_for_rounds(4).unwrap().len(), 4);
        assert!(tiers_for_rounds(0).is_err());
        assert!(tiers_for_rounds(5).is_err());
    }

    #[test]
    fn bracket_size_rejects_rounds_before_shifting() {
        assert_eq!(qualification_bracket_size(1).unwrap(), 2);
        assert_eq!(qualification_bracket_size(4).unwrap(), 16);
        assert!(matches!(
            qualification_bracket_size(40),
            Err(BracketError::QualificationShape(_))
        ));
        assert!(qualification_bracket_size(0).is_err());
    }

    #[test]
    fn seed_pool_sizes() {
        assert_eq!(seed_pool_size(4, 1), 0);
        assert_eq!(seed_pool_size(4, 2), 4);
        assert_eq!(seed_pool_size(4, 3), 8);
        assert_eq!(seed_pool_size(8, 4), 32);
    }

    #[test]
    fn seeds_are_spread_round_robin_across_brackets() {
        // 4 brackets of 8 (3 rounds): 8 seeds, 24 unseeded.
        let seeds: Vec<u32> = (1..=8).collect();
        let unseeded: Vec<u32> = (9..=32).collect();
        let maps = build_qualification_brackets(4, 3, &seeds, &unseeded, 99).unwrap();

        assert_eq!(maps.len(), 4);
        for (k, map) in maps.iter().enumerate() {
            assert_eq!(map[&1], k as u32 + 1, "TOP of bracket {k}");
            assert_eq!(map[&8], k as u32 + 5, "BOTTOM of bracket {k}");
            assert_eq!(map.len(), 8);
        }
    }

    #[test]
    fn unseeded_fill_uses_one_shared_shuffle() {
        let seeds: Vec<u32> = (1..=2).collect();
        let unseeded: Vec<u32> = (3..=8).collect();
        let maps = build_qualification_brackets(2, 2, &seeds, &unseeded, 5).unwrap();

        let expected = deterministic_shuffle(&unseeded, 5);
        let placed: Vec<u32> = maps
            .iter()
            .flat_map(|m| (2..=4u32).map(move |s| m[&s]))
            .collect();
        assert_eq!(placed, expected);
    }

    #[test]
    fn reproducible_with_the_same_seed() {
        let seeds: Vec<u32> = (1..=16).collect();
        let unseeded: Vec<u32> = (17..=64).collect();
        let a = build_qualification_brackets(4, 4, &seeds, &unseeded, 8).unwrap();
        let b = build_qualification_brackets(4, 4, &seeds, &unseeded, 8).unwrap();
        assert_eq!(a, b);
        let c = build_qualification_brackets(4, 4, &seeds, &unseeded, 9).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn reports_short_pools() {
        let seeds: Vec<u32> = (1..=3).collect();
        let unseeded: Vec<u32> = (4..=40).collect();
        assert_eq!(
            build_qualification_brackets(4, 2, &seeds, &unseeded, 1),
            Err(BracketError::CountMismatch { needed: 4, available: 3 })
        );

        let seeds: Vec<u32> = (1..=4).collect();
        let unseeded: Vec<u32> = (5..=10).collect();
        assert_eq!(
            build_qualification_brackets(4, 2, &seeds, &unseeded, 1),
            Err(BracketError::CountMismatch { needed: 12, available: 6 })
        );
    }

    #[test]
    fn single_round_brackets_have_no_seeds() {
        let unseeded: Vec<u32> = (1..=6).collect();
        let maps = build_qualification_brackets(3, 1, &[], &unseeded, 1).unwrap();
        assert_eq!(maps.len(), 3);
        assert!(maps.iter().all(|m| m.len() == 2));
    }
}
