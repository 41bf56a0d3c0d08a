// Canonical seed anchors: which bracket slot each seed band occupies.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::BracketError;

/// Largest bracket the anchor map is defined for.
pub const MAX_BRACKET_SIZE: u32 = 128;

/// A contiguous range of seed numbers placed together, e.g. seeds 5-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedBand {
    pub first: usize,
    pub last: usize,
}

impl SeedBand {
    /// Number of seeds in the band.
    pub fn len(&self) -> usize {
        self.last - self.first + 1
    }

    pub fn is_empty(&self) -> bool {
        self.last < self.first
    }

    pub fn contains(&self, seed: usize) -> bool {
        (self.first..=self.last).contains(&seed)
    }

    /// Parse a band label such as `"1"`, `"2"` or `"5-8"`.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        match label.split_once('-') {
            Some((a, b)) => {
                let first = a.trim().parse().ok()?;
                let last = b.trim().parse().ok()?;
                (first >= 1 && last >= first).then_some(SeedBand { first, last })
            }
            None => {
                let seed = label.parse().ok()?;
                (seed >= 1).then_some(SeedBand {
                    first: seed,
                    last: seed,
                })
            }
        }
    }
}

impl fmt::Display for SeedBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}-{}", self.first, self.last)
        }
    }
}

/// The canonical slots of one seed band. `slots[i]` belongs to seed
/// `band.first + i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandAnchors {
    pub band: SeedBand,
    pub slots: Vec<u32>,
}

/// Anchor maps computed so far, shared by every thread.
static ANCHOR_CACHE: OnceLock<Mutex<HashMap<u32, Vec<BandAnchors>>>> = OnceLock::new();

fn anchor_cache() -> MutexGuard<'static, HashMap<u32, Vec<BandAnchors>>> {
    // The cache only ever holds complete maps, so a poisoned lock is still usable.
    ANCHOR_CACHE
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Validate that `size` is a bracket size the anchor map supports.
pub fn check_bracket_size(size: u32) -> Result<(), BracketError> {
    if size < 2 || size > MAX_BRACKET_SIZE || !size.is_power_of_two() {
        return Err(BracketError::UnsupportedSize {
            size,
            max: MAX_BRACKET_SIZE,
        });
    }
    Ok(())
}

/// Full anchor map for a bracket of `size` slots, strongest band first.
///
/// Seed 1 sits on slot 1 and seed 2 on slot `size`. Every following band
/// doubles the seeded sections: the previously placed slots are walked
/// weakest-first and each is reflected inside its section, so the new
/// band's slots are mirrored pairs (`size + 1 - p`).
pub fn seed_anchor_map(size: u32) -> Result<Vec<BandAnchors>, BracketError> {
    check_bracket_size(size)?;

    if let Some(cached) = anchor_cache().get(&size).cloned() {
        return Ok(cached);
    }

    let base = vec![
        BandAnchors {
            band: SeedBand { first: 1, last: 1 },
            slots: vec![1],
        },
        BandAnchors {
            band: SeedBand { first: 2, last: 2 },
            slots: vec![size],
        },
    ];
    let bands = extend_bands(size, base);

    anchor_cache().insert(size, bands.clone());
    Ok(bands)
}

fn extend_bands(size: u32, mut bands: Vec<BandAnchors>) -> Vec<BandAnchors> {
    let level = bands.len() - 1;
    let section = size >> level;
    if section < 2 {
        return bands;
    }

    let placed: Vec<u32> = bands.iter().flat_map(|b| b.slots.iter().copied()).collect();
    let slots: Vec<u32> = placed
        .iter()
        .rev()
        .map(|&slot| reflect_in_section(slot, section))
        .collect();

    bands.push(BandAnchors {
        band: SeedBand {
            first: placed.len() + 1,
            last: placed.len() + slots.len(),
        },
        slots,
    });
    extend_bands(size, bands)
}

/// Mirror `slot` to the opposite end of its section of `section` slots.
fn reflect_in_section(slot: u32, section: u32) -> u32 {
    let start = ((slot - 1) / section) * section + 1;
    let end = start + section - 1;
    start + end - slot
}

/// Whether `seeds` ends exactly on a band boundary (0, 1, 2, 4, 8, ...).
pub fn is_band_boundary(seeds: usize) -> bool {
    seeds == 0 || seeds.is_power_of_two()
}

/// The bands populated by `seeds` seeds, in fill order.
///
/// Bands are never split: a seed count that stops in the middle of a band
/// is rejected.
pub fn band_sequence_for_seeds(size: u32, seeds: usize) -> Result<Vec<BandAnchors>, BracketError> {
    let bands = seed_anchor_map(size)?;
    if seeds > size as usize || !is_band_boundary(seeds) {
        return Err(BracketError::BandMisaligned { seeds, size });
    }

    Ok(bands.into_iter().take_while(|b| b.band.last <= seeds).collect())
}

/// Every anchor slot in seed order (seed 1's slot first).
pub fn anchor_order(size: u32) -> Result<Vec<u32>, BracketError> {
    Ok(seed_anchor_map(size)?
        .into_iter()
        .flat_map(|b| b.slots)
        .collect())
}

/// Look up a band of a `size`-slot bracket by its label.
pub fn find_band(size: u32, label: &str) -> Result<BandAnchors, BracketError> {
    let wanted = SeedBand::parse(label).ok_or_else(|| BracketError::UnknownBand(label.to_string()))?;
    seed_anchor_map(size)?
        .into_iter()
        .find(|b| b.band == wanted)
        .ok_or_else(|| BracketError::UnknownBand(label.to_string()))
}
