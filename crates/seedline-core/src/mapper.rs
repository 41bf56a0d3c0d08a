// Full-bracket mapping: seeds on anchors, shuffled unseeded entries elsewhere.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use tracing::warn;

use crate::anchors::{band_sequence_for_seeds, check_bracket_size};
use crate::error::BracketError;
use crate::shuffle::deterministic_shuffle;

/// Slot number to occupant.
pub type SlotMap<T> = BTreeMap<u32, T>;

/// Put `seeded[i]` (seed `i + 1`) on its canonical anchor in a bracket of
/// `size` slots.
pub fn place_seeds<T: Clone>(size: u32, seeded: &[T]) -> Result<SlotMap<T>, BracketError> {
    if seeded.len() > size as usize {
        return Err(BracketError::TooManySeeds {
            seeds: seeded.len(),
            draw: size,
        });
    }

    let bands = band_sequence_for_seeds(size, seeded.len())?;
    Ok(bands
        .iter()
        .flat_map(|b| b.slots.iter().copied())
        .zip(seeded.iter().cloned())
        .collect())
}

/// Fill `open` slots, in the given order, from a deterministic shuffle of
/// `unseeded`.
///
/// Fewer unseeded entries than open slots is an error. Surplus entries are
/// dropped after shuffling.
pub(crate) fn fill_open_slots<T: Clone>(
    map: &mut SlotMap<T>,
    open: &[u32],
    unseeded: &[T],
    rng_seed: u64,
) -> Result<(), BracketError> {
    if unseeded.len() < open.len() {
        return Err(BracketError::CountMismatch {
            needed: open.len(),
            available: unseeded.len(),
        });
    }
    if unseeded.len() > open.len() {
        warn!(
            "{} unseeded entries supplied for {} open slots; surplus dropped",
            unseeded.len(),
            open.len()
        );
    }

    let shuffled = deterministic_shuffle(unseeded, rng_seed);
    for (&slot, entry) in open.iter().zip(shuffled) {
        map.insert(slot, entry);
    }
    Ok(())
}

/// Build the complete slot mapping of a power-of-two bracket.
///
/// `seeded` is in seed order (index 0 is seed 1). Every slot not claimed by
/// a seed anchor is filled in ascending order from the shuffled `unseeded`
/// list.
pub fn build_bracket<T>(
    size: u32,
    seeded: &[T],
    unseeded: &[T],
    rng_seed: u64,
) -> Result<SlotMap<T>, BracketError>
where
    T: Clone + Eq + Hash + Debug,
{
    check_bracket_size(size)?;
    let mut map = place_seeds(size, seeded)?;

    let open: Vec<u32> = (1..=size).filter(|s| !map.contains_key(s)).collect();
    fill_open_slots(&mut map, &open, unseeded, rng_seed)?;

    verify_bijection(&map, size, &BTreeSet::new())?;
    Ok(map)
}

/// Check that `map` and `byes` together cover `1..=size` exactly once and
/// that no occupant appears twice.
pub fn verify_bijection<T>(
    map: &SlotMap<T>,
    size: u32,
    byes: &BTreeSet<u32>,
) -> Result<(), BracketError>
where
    T: Eq + Hash + Debug,
{
    if let Some(slot) = map.keys().chain(byes.iter()).find(|&&s| s == 0 || s > size) {
        return Err(BracketError::BrokenMapping(format!(
            "slot {slot} outside 1..={size}"
        )));
    }
    if let Some(slot) = byes.iter().find(|s| map.contains_key(s)) {
        return Err(BracketError::BrokenMapping(format!(
            "slot {slot} is both a bye and occupied"
        )));
    }
    if map.len() + byes.len() != size as usize {
        return Err(BracketError::BrokenMapping(format!(
            "{} occupied + {} byes does not cover {size} slots",
            map.len(),
            byes.len()
        )));
    }

    let mut seen = HashSet::with_capacity(map.len());
    for (slot, entry) in map {
        if !seen.insert(entry) {
            return Err(BracketError::BrokenMapping(format!(
                "{entry:?} placed twice (again at slot {slot})"
            )));
        }
    }
    Ok(())
}
