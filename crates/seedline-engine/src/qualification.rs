// Qualification confirmation: tiered brackets and their full round trees.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use tracing::{info, warn};

use seedline_core::qualification::{qualification_bracket_size, seed_pool_size};
use seedline_core::roster::ranking_key;
use seedline_core::rounds::{join_slot, qual_slot, round_pairs, split_slot};
use seedline_core::shuffle::fresh_seed;
use seedline_core::build_qualification_brackets;
use seedline_store::rows;
use seedline_store::{
    EntryId, Match, MatchId, NewMatch, Phase, SnapshotKind, TournamentEntry, TournamentId,
    TournamentState,
};

use crate::bracket::{ensure_state, round_name};
use crate::eligibility::{check_entries, EligibilityGate};
use crate::error::EngineError;
use crate::{snapshot, Engine};

/// Layout of all qualification brackets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualificationOutcome {
    pub tournament_id: TournamentId,
    pub rng_seed: u64,
    /// Local slots per bracket.
    pub bracket_size: u32,
    /// One map per bracket, keyed by stored (offset) slot.
    pub brackets: Vec<BTreeMap<u32, EntryId>>,
    pub round_one: Vec<MatchId>,
}

/// Decided qualification finals.
pub(crate) fn decided_finals(matches: &[Match]) -> impl Iterator<Item = &Match> {
    matches
        .iter()
        .filter(|m| m.phase == Phase::Qualification && m.round_size == 2 && m.has_result())
}

/// Entries that won their qualification bracket.
pub(crate) fn bracket_winners(matches: &[Match]) -> HashSet<EntryId> {
    decided_finals(matches)
        .filter_map(|m| m.winner_entry_id)
        .collect()
}

impl<G: EligibilityGate> Engine<G> {
    /// Build the qualification brackets and their empty round trees, with
    /// round one populated.
    pub fn confirm_qualification(
        &self,
        tournament_id: TournamentId,
        rng_seed: Option<u64>,
    ) -> Result<QualificationOutcome, EngineError> {
        self.db.write(|tx| {
            let mut tournament = rows::load_tournament(tx, tournament_id)?;
            ensure_state(
                &tournament,
                &[TournamentState::Registration, TournamentState::Qualification],
                "qualification confirmation",
            )?;
            if !tournament.has_qualification() {
                return Err(EngineError::configuration(
                    "qualifier_count",
                    "tournament has no qualification brackets",
                ));
            }

            let entries = rows::load_entries(tx, tournament_id)?;
            check_entries(&self.gate, tournament.season_id, &entries)?;

            let existing = rows::load_matches(tx, tournament_id, Some(Phase::Qualification))?;
            if let Some(m) = existing.iter().find(|m| m.has_result()) {
                return Err(EngineError::conflict(format!(
                    "qualification match {} already has a result",
                    m.id
                )));
            }

            let brackets = tournament.qualifier_count as usize;
            let rounds = tournament.qual_rounds;
            let size = qualification_bracket_size(rounds)?;

            let mut pool: Vec<&TournamentEntry> = entries
                .iter()
                .filter(|e| e.is_active() && e.entry_type.is_qualifying())
                .collect();
            pool.sort_by_key(|e| ranking_key(e.world_ranking, e.id));
            let pool: Vec<EntryId> = pool.iter().map(|e| e.id).collect();

            let capacity = brackets * size as usize;
            if pool.len() < capacity {
                return Err(EngineError::Capacity {
                    what: "qualifiers".into(),
                    needed: capacity,
                    available: pool.len(),
                });
            }
            if pool.len() > capacity {
                warn!(
                    tournament_id,
                    qualifiers = pool.len(),
                    capacity,
                    "more qualifiers than qualification slots; surplus left unplaced"
                );
            }
            let (seeded, unseeded) = pool.split_at(seed_pool_size(brackets, rounds));

            let rng = rng_seed
                .or(tournament.rng_seed_active)
                .unwrap_or_else(fresh_seed);
            let local_maps = build_qualification_brackets(brackets, rounds, seeded, unseeded, rng)?;

            let global_maps: Vec<BTreeMap<u32, EntryId>> = local_maps
                .iter()
                .enumerate()
                .map(|(k, map)| map.iter().map(|(&local, &id)| (qual_slot(k, local), id)).collect())
                .collect();
            let position_of: HashMap<EntryId, u32> = global_maps
                .iter()
                .flat_map(|m| m.iter().map(|(&slot, &id)| (id, slot)))
                .collect();

            let changed: Vec<TournamentEntry> = entries
                .iter()
                .filter(|e| e.is_active())
                .filter_map(|e| {
                    let next = match position_of.get(&e.id) {
                        Some(&slot) => Some(slot),
                        None if e.position.is_some_and(|p| split_slot(p).0 > 0) => None,
                        None => e.position,
                    };
                    (next != e.position).then(|| TournamentEntry {
                        position: next,
                        ..e.clone()
                    })
                })
                .collect();
            rows::update_entries(tx, &changed)?;

            let mut kept = HashSet::new();
            let mut round_one = Vec::new();
            for (k, map) in global_maps.iter().enumerate() {
                let group = k as u32 + 1;
                let mut round_size = size;
                while round_size >= 2 {
                    let first = round_size == size;
                    for (top_local, bottom_local) in round_pairs(round_size) {
                        let top = join_slot(group, top_local);
                        let bottom = join_slot(group, bottom_local);
                        let pairing = if first {
                            (map.get(&top).copied(), map.get(&bottom).copied())
                        } else {
                            (None, None)
                        };
                        let previous = existing
                            .iter()
                            .find(|m| m.round_size == round_size && m.slot_top == top);
                        let id = rows::upsert_match(
                            tx,
                            tournament_id,
                            &NewMatch {
                                phase: Phase::Qualification,
                                round_name: round_name(&tournament, Phase::Qualification, round_size),
                                round_size,
                                slot_top: top,
                                slot_bottom: bottom,
                                top_entry_id: pairing.0,
                                bottom_entry_id: pairing.1,
                            },
                        )?;
                        if previous.is_some_and(|m| m.pairing() != pairing) {
                            rows::delete_schedule(tx, id)?;
                        }
                        kept.insert(id);
                        if first {
                            round_one.push(id);
                        }
                    }
                    round_size /= 2;
                }
            }

            let stale: Vec<MatchId> = existing
                .iter()
                .filter(|m| !kept.contains(&m.id))
                .map(|m| m.id)
                .collect();
            rows::delete_matches_by_id(tx, &stale)?;

            tournament.state = TournamentState::Qualification;
            tournament.rng_seed_active = Some(rng);
            rows::update_tournament_progress(tx, &tournament)?;

            snapshot::capture(
                tx,
                tournament_id,
                SnapshotKind::Qualification,
                self.config.snapshots,
            )?;

            info!(
                tournament_id,
                rng_seed = rng,
                brackets,
                rounds,
                matches = kept.len(),
                "qualification confirmed"
            );

            Ok(QualificationOutcome {
                tournament_id,
                rng_seed: rng,
                bracket_size: size,
                brackets: global_maps,
                round_one,
            })
        })
    }
}
