// Reshuffling a confirmed main draw: soft, hard and band-scoped.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use seedline_core::anchors::find_band;
use seedline_core::rounds::{pair_of, round_one_opponent};
use seedline_core::shuffle::fresh_seed;
use seedline_core::{deterministic_shuffle, template_size};
use seedline_store::rows;
use seedline_store::{
    EntryId, MatchId, Phase, SnapshotKind, TournamentEntry, TournamentId, TournamentState,
};

use crate::bracket::ensure_state;
use crate::draw::DrawOutcome;
use crate::eligibility::EligibilityGate;
use crate::error::EngineError;
use crate::{snapshot, Engine};

/// Which part of the main draw a regeneration may move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegenerateScope {
    /// Unseeded entries of undecided round-1 matches.
    Soft,
    /// Unseeded entries of every round-1 match; touched results are
    /// cleared and later rounds dropped.
    Hard,
    /// One seed band by label (`"5-8"`), or `"Unseeded"`.
    Band(String),
}

impl RegenerateScope {
    fn is_unseeded_band(label: &str) -> bool {
        label.trim().eq_ignore_ascii_case("unseeded")
    }
}

impl fmt::Display for RegenerateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegenerateScope::Soft => f.write_str("soft"),
            RegenerateScope::Hard => f.write_str("hard"),
            RegenerateScope::Band(label) => write!(f, "band {label}"),
        }
    }
}

/// Slots whose occupant may move, ascending. `frozen` slots never move,
/// except under a hard scope which ignores them.
fn movable_slots(
    scope: &RegenerateScope,
    template: u32,
    entries: &[TournamentEntry],
    byes: &BTreeSet<u32>,
    frozen: &HashSet<u32>,
) -> Result<Vec<u32>, EngineError> {
    let receivers: HashSet<u32> = byes.iter().map(|&b| round_one_opponent(b)).collect();
    let placed = entries
        .iter()
        .filter(|e| e.is_active())
        .filter_map(|e| e.main_draw_position().map(|slot| (slot, e)));

    let slots: BTreeSet<u32> = match scope {
        RegenerateScope::Soft => placed
            .filter(|(slot, e)| {
                e.seed_number.is_none() && !receivers.contains(slot) && !frozen.contains(slot)
            })
            .map(|(slot, _)| slot)
            .collect(),
        RegenerateScope::Hard => placed
            .filter(|(slot, e)| e.seed_number.is_none() && !receivers.contains(slot))
            .map(|(slot, _)| slot)
            .collect(),
        RegenerateScope::Band(label) if RegenerateScope::is_unseeded_band(label) => placed
            .filter(|(slot, e)| e.seed_number.is_none() && !frozen.contains(slot))
            .map(|(slot, _)| slot)
            .collect(),
        RegenerateScope::Band(label) => {
            let band = find_band(template, label)?;
            let seeded = entries
                .iter()
                .filter(|e| e.is_active() && e.seed_number.is_some())
                .count();
            if band.band.last > seeded {
                return Err(EngineError::configuration(
                    "band",
                    format!("band {} is not seeded in this draw ({seeded} seeds)", band.band),
                ));
            }
            let anchors: HashSet<u32> = band.slots.iter().copied().collect();
            placed
                .filter(|(slot, e)| {
                    anchors.contains(slot)
                        && e.seed_number.is_some_and(|s| band.band.contains(s as usize))
                        && !frozen.contains(slot)
                })
                .map(|(slot, _)| slot)
                .collect()
        }
    };
    Ok(slots.into_iter().collect())
}

impl<G: EligibilityGate> Engine<G> {
    /// Reshuffle part of a confirmed main draw with `rng_seed`, or a fresh
    /// seed when none is given.
    pub fn regenerate(
        &self,
        tournament_id: TournamentId,
        scope: RegenerateScope,
        rng_seed: Option<u64>,
    ) -> Result<DrawOutcome, EngineError> {
        self.db.write(|tx| {
            let mut tournament = rows::load_tournament(tx, tournament_id)?;
            ensure_state(&tournament, &[TournamentState::MainDraw], "regeneration")?;
            let template = template_size(tournament.draw_size)?;
            let hard = scope == RegenerateScope::Hard;

            let entries = rows::load_entries(tx, tournament_id)?;
            let mut matches = rows::load_matches(tx, tournament_id, Some(Phase::MainDraw))?;
            let mut frozen: HashSet<u32> = matches
                .iter()
                .filter(|m| m.round_size == template && m.has_result())
                .flat_map(|m| [m.slot_top, m.slot_bottom])
                .collect();
            if !hard {
                // Entries already sitting in a later round keep their slot;
                // hard regeneration drops those rounds instead.
                let advanced: HashSet<EntryId> = matches
                    .iter()
                    .filter(|m| m.round_size < template)
                    .flat_map(|m| [m.top_entry_id, m.bottom_entry_id])
                    .flatten()
                    .collect();
                frozen.extend(
                    entries
                        .iter()
                        .filter(|e| e.is_active() && advanced.contains(&e.id))
                        .filter_map(|e| e.main_draw_position()),
                );
            }

            let slots = movable_slots(&scope, template, &entries, &tournament.bye_slots, &frozen)?;
            let mut placed: BTreeMap<u32, EntryId> = entries
                .iter()
                .filter(|e| e.is_active())
                .filter_map(|e| e.main_draw_position().map(|p| (p, e.id)))
                .collect();
            let current: Vec<EntryId> = slots.iter().filter_map(|s| placed.get(s).copied()).collect();

            let rng = rng_seed.unwrap_or_else(fresh_seed);
            let shuffled = deterministic_shuffle(&current, rng);

            let mut updates = Vec::new();
            for (&slot, &entry_id) in slots.iter().zip(&shuffled) {
                if placed.insert(slot, entry_id) == Some(entry_id) {
                    continue;
                }
                if let Some(entry) = entries.iter().find(|e| e.id == entry_id) {
                    updates.push(TournamentEntry {
                        position: Some(slot),
                        ..entry.clone()
                    });
                }
            }
            rows::update_entries(tx, &updates)?;
            debug!(tournament_id, moved = updates.len(), "regenerated positions written");

            let pairs: BTreeSet<u32> = slots.iter().map(|&s| pair_of(s).0).collect();
            let mut reset = 0;
            for m in matches
                .iter_mut()
                .filter(|m| m.round_size == template && pairs.contains(&m.slot_top))
            {
                let pairing = (placed.get(&m.slot_top).copied(), placed.get(&m.slot_bottom).copied());
                if m.pairing() == pairing {
                    continue;
                }
                if m.has_result() {
                    if !hard {
                        return Err(EngineError::conflict(format!(
                            "match {} already has a result",
                            m.id
                        )));
                    }
                    m.reset_result();
                    m.needs_review = false;
                    reset += 1;
                }
                m.top_entry_id = pairing.0;
                m.bottom_entry_id = pairing.1;
                rows::update_match(tx, m)?;
                rows::delete_schedule(tx, m.id)?;
            }

            let mut dropped = 0;
            if hard {
                let later: Vec<MatchId> = matches
                    .iter()
                    .filter(|m| m.round_size < template)
                    .map(|m| m.id)
                    .collect();
                dropped = rows::delete_matches_by_id(tx, &later)?;
                matches.retain(|m| m.round_size == template);
            }

            tournament.rng_seed_active = Some(rng);
            rows::update_tournament_progress(tx, &tournament)?;

            let entries = rows::load_entries(tx, tournament_id)?;
            let outcome = DrawOutcome::from_rows(&tournament, &entries, &matches, rng)?;
            snapshot::capture(tx, tournament_id, SnapshotKind::Regenerate, self.config.snapshots)?;

            info!(
                tournament_id,
                rng_seed = rng,
                scope = %scope,
                moved = updates.len(),
                reset,
                dropped,
                "main draw regenerated"
            );
            Ok(outcome)
        })
    }
}
