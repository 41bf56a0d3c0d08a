// Non-power-of-two draws embedded in the next power-of-two template.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::anchors::{anchor_order, check_bracket_size};
use crate::error::BracketError;
use crate::mapper::{build_bracket, fill_open_slots, place_seeds, verify_bijection, SlotMap};
use crate::rounds::{round_one_opponent, round_pairs};

/// A draw laid out on its power-of-two template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedBracket<T> {
    /// Actual number of competitors in the draw.
    pub draw_size: u32,
    /// Power-of-two bracket the draw is embedded in.
    pub template_size: u32,
    /// Occupied slots.
    pub slots: SlotMap<T>,
    /// Slots deliberately left empty. Their round-1 opponent advances
    /// without playing.
    pub byes: BTreeSet<u32>,
}

impl<T> EmbeddedBracket<T> {
    /// Round-1 pairs with both sides occupied, i.e. the matches to create.
    pub fn playable_pairs(&self) -> Vec<(u32, u32)> {
        round_pairs(self.template_size)
            .into_iter()
            .filter(|(top, bottom)| self.slots.contains_key(top) && self.slots.contains_key(bottom))
            .collect()
    }

    /// Slots whose occupant advances on a bye.
    pub fn bye_receivers(&self) -> Vec<u32> {
        self.byes.iter().map(|&b| round_one_opponent(b)).collect()
    }
}

/// Smallest power-of-two template that holds `draw_size` competitors.
pub fn template_size(draw_size: u32) -> Result<u32, BracketError> {
    let template = draw_size.max(2).next_power_of_two();
    check_bracket_size(template)?;
    if draw_size < 2 {
        return Err(BracketError::UnsupportedSize {
            size: draw_size,
            max: crate::anchors::MAX_BRACKET_SIZE,
        });
    }
    Ok(template)
}

/// Lay out a draw of `draw_size` competitors, embedding it with byes when
/// it is not a power of two.
///
/// Bye receivers are the first `template - draw_size` slots of the anchor
/// order, so the strongest seeds always get the byes and any surplus byes
/// go to the next canonical positions, one per round-1 pair. The bye is
/// the receiver's round-1 opponent slot, which stays empty.
pub fn build_embedded_bracket<T>(
    draw_size: u32,
    seeded: &[T],
    unseeded: &[T],
    rng_seed: u64,
) -> Result<EmbeddedBracket<T>, BracketError>
where
    T: Clone + Eq + Hash + Debug,
{
    let template = template_size(draw_size)?;
    if template == draw_size {
        return Ok(EmbeddedBracket {
            draw_size,
            template_size: template,
            slots: build_bracket(template, seeded, unseeded, rng_seed)?,
            byes: BTreeSet::new(),
        });
    }
    if seeded.len() > draw_size as usize {
        return Err(BracketError::TooManySeeds {
            seeds: seeded.len(),
            draw: draw_size,
        });
    }

    let mut slots = place_seeds(template, seeded)?;

    let bye_count = (template - draw_size) as usize;
    let byes: BTreeSet<u32> = anchor_order(template)?
        .into_iter()
        .take(bye_count)
        .map(round_one_opponent)
        .collect();
    debug!(
        draw_size,
        template,
        bye_count,
        seeds = seeded.len(),
        "embedding draw"
    );

    let open: Vec<u32> = (1..=template)
        .filter(|s| !slots.contains_key(s) && !byes.contains(s))
        .collect();
    fill_open_slots(&mut slots, &open, unseeded, rng_seed)?;

    verify_bijection(&slots, template, &byes)?;
    Ok(EmbeddedBracket {
        draw_size,
        template_size: template,
        slots,
        byes,
    })
}
