// Main-draw confirmation: pick seeds, embed byes, materialize round one.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info};

use seedline_core::roster::ranking_key;
use seedline_core::rounds::main_draw_round_name;
use seedline_core::shuffle::fresh_seed;
use seedline_core::{build_embedded_bracket, template_size};
use seedline_store::rows;
use seedline_store::{
    EntryId, Match, MatchId, NewMatch, Phase, SnapshotKind, Tournament, TournamentEntry,
    TournamentId, TournamentState,
};

use crate::bracket::{effective_seed_count, ensure_state};
use crate::eligibility::{check_entries, EligibilityGate};
use crate::error::EngineError;
use crate::qualification::bracket_winners;
use crate::{snapshot, Engine};

/// Main-draw layout after a confirmation or regeneration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrawOutcome {
    pub tournament_id: TournamentId,
    pub rng_seed: u64,
    pub template_size: u32,
    /// Main-draw slot to entry.
    pub slots: BTreeMap<u32, EntryId>,
    pub byes: BTreeSet<u32>,
    /// Round-one match ids, by slot.
    pub round_one: Vec<MatchId>,
}

impl DrawOutcome {
    /// Read the layout back from persisted rows.
    pub(crate) fn from_rows(
        tournament: &Tournament,
        entries: &[TournamentEntry],
        matches: &[Match],
        rng_seed: u64,
    ) -> Result<Self, EngineError> {
        let template = template_size(tournament.draw_size)?;
        let slots = entries
            .iter()
            .filter(|e| e.is_active())
            .filter_map(|e| e.main_draw_position().map(|p| (p, e.id)))
            .collect();
        let mut round_one: Vec<&Match> = matches
            .iter()
            .filter(|m| m.phase == Phase::MainDraw && m.round_size == template)
            .collect();
        round_one.sort_by_key(|m| m.slot_top);
        Ok(DrawOutcome {
            tournament_id: tournament.id,
            rng_seed,
            template_size: template,
            slots,
            byes: tournament.bye_slots.clone(),
            round_one: round_one.into_iter().map(|m| m.id).collect(),
        })
    }

    pub fn slot_of(&self, entry_id: EntryId) -> Option<u32> {
        self.slots
            .iter()
            .find_map(|(&slot, &id)| (id == entry_id).then_some(slot))
    }
}

/// Seed order: manual seed number first, then ranking (unranked last),
/// then entry id.
fn seeding_key(entry: &TournamentEntry) -> (bool, u32, (bool, u32, i64)) {
    (
        entry.seed_number.is_none(),
        entry.seed_number.unwrap_or(u32::MAX),
        ranking_key(entry.world_ranking, entry.id),
    )
}

/// Active entries that belong in the main draw: direct acceptances,
/// wildcards and qualification bracket winners.
pub(crate) fn main_draw_pool<'a>(
    entries: &'a [TournamentEntry],
    qualification_matches: &[Match],
) -> Vec<&'a TournamentEntry> {
    let winners = bracket_winners(qualification_matches);
    let mut pool: Vec<&TournamentEntry> = entries
        .iter()
        .filter(|e| e.is_active())
        .filter(|e| {
            e.entry_type.is_direct() || (e.entry_type.is_qualifying() && winners.contains(&e.id))
        })
        .collect();
    pool.sort_by_key(|e| seeding_key(e));
    pool
}

impl<G: EligibilityGate> Engine<G> {
    /// Build the main draw and create its round-one matches.
    ///
    /// Without `rng_seed` the stored seed is reused, so confirming again
    /// with unchanged entries reproduces the same draw; a fresh seed is
    /// drawn only when none is stored.
    pub fn confirm_main_draw(
        &self,
        tournament_id: TournamentId,
        rng_seed: Option<u64>,
    ) -> Result<DrawOutcome, EngineError> {
        self.db.write(|tx| {
            let mut tournament = rows::load_tournament(tx, tournament_id)?;
            ensure_state(
                &tournament,
                &[
                    TournamentState::Registration,
                    TournamentState::Qualification,
                    TournamentState::MainDraw,
                ],
                "main-draw confirmation",
            )?;

            let entries = rows::load_entries(tx, tournament_id)?;
            check_entries(&self.gate, tournament.season_id, &entries)?;

            let md_matches = rows::load_matches(tx, tournament_id, Some(Phase::MainDraw))?;
            if let Some(m) = md_matches.iter().find(|m| m.has_result()) {
                return Err(EngineError::conflict(format!(
                    "main-draw match {} already has a result",
                    m.id
                )));
            }
            let qual_matches = rows::load_matches(tx, tournament_id, Some(Phase::Qualification))?;

            let pool: Vec<EntryId> = main_draw_pool(&entries, &qual_matches)
                .iter()
                .map(|e| e.id)
                .collect();
            let seeds = effective_seed_count(&tournament, &self.config.seeding)?;
            if pool.len() < seeds {
                return Err(EngineError::Capacity {
                    what: "main-draw entries to seed".into(),
                    needed: seeds,
                    available: pool.len(),
                });
            }
            let (seeded, unseeded) = pool.split_at(seeds);

            let rng = rng_seed
                .or(tournament.rng_seed_active)
                .unwrap_or_else(fresh_seed);
            let bracket = build_embedded_bracket(tournament.draw_size, seeded, unseeded, rng)?;

            let position_of: HashMap<EntryId, u32> =
                bracket.slots.iter().map(|(&slot, &id)| (id, slot)).collect();
            let seed_of: HashMap<EntryId, u32> = seeded
                .iter()
                .enumerate()
                .map(|(i, &id)| (id, i as u32 + 1))
                .collect();

            let mut changed = Vec::new();
            for entry in entries.iter().filter(|e| e.is_active()) {
                let mut next = entry.clone();
                next.seed_number = seed_of.get(&entry.id).copied();
                match position_of.get(&entry.id) {
                    Some(&slot) => next.position = Some(slot),
                    None if entry.main_draw_position().is_some() => next.position = None,
                    None => {}
                }
                if next != *entry {
                    changed.push(next);
                }
            }
            rows::update_entries(tx, &changed)?;
            debug!(tournament_id, changed = changed.len(), "entry placements written");

            let round_size = bracket.template_size;
            let mut round_one = Vec::new();
            for (top, bottom) in bracket.playable_pairs() {
                let pairing = (bracket.slots.get(&top).copied(), bracket.slots.get(&bottom).copied());
                let previous = md_matches
                    .iter()
                    .find(|m| m.round_size == round_size && m.slot_top == top);
                let id = rows::upsert_match(
                    tx,
                    tournament_id,
                    &NewMatch {
                        phase: Phase::MainDraw,
                        round_name: main_draw_round_name(round_size),
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
                round_one.push(id);
            }

            let kept: HashSet<MatchId> = round_one.iter().copied().collect();
            let stale: Vec<MatchId> = md_matches
                .iter()
                .filter(|m| !kept.contains(&m.id))
                .map(|m| m.id)
                .collect();
            rows::delete_matches_by_id(tx, &stale)?;

            tournament.state = TournamentState::MainDraw;
            tournament.rng_seed_active = Some(rng);
            tournament.bye_slots = bracket.byes.clone();
            rows::update_tournament_progress(tx, &tournament)?;

            snapshot::capture(tx, tournament_id, SnapshotKind::Confirm, self.config.snapshots)?;

            info!(
                tournament_id,
                rng_seed = rng,
                seeds,
                byes = bracket.byes.len(),
                matches = round_one.len(),
                stale = stale.len(),
                "main draw confirmed"
            );

            Ok(DrawOutcome {
                tournament_id,
                rng_seed: rng,
                template_size: round_size,
                slots: bracket.slots,
                byes: bracket.byes,
                round_one,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedline_store::{EntryStatus, EntryType, MatchState};

    fn entry(id: i64, entry_type: EntryType, ranking: Option<u32>, seed: Option<u32>) -> TournamentEntry {
        TournamentEntry {
            id,
            tournament_id: 1,
            competitor_id: id,
            entry_type,
            status: EntryStatus::Active,
            world_ranking: ranking,
            seed_number: seed,
            position: None,
            registration_rank: None,
        }
    }

    fn qual_final(top: EntryId, bottom: EntryId, winner: Option<EntryId>) -> Match {
        Match {
            id: 1,
            tournament_id: 1,
            phase: Phase::Qualification,
            round_name: "Q2".into(),
            round_size: 2,
            slot_top: 1001,
            slot_bottom: 1002,
            top_entry_id: Some(top),
            bottom_entry_id: Some(bottom),
            winner_entry_id: winner,
            score: vec![],
            outcome: None,
            state: if winner.is_some() {
                MatchState::Done
            } else {
                MatchState::Pending
            },
            needs_review: false,
        }
    }

    #[test]
    fn pool_orders_manual_seeds_then_ranking() {
        let entries = vec![
            entry(1, EntryType::DirectAccept, Some(5), None),
            entry(2, EntryType::Wildcard, None, None),
            entry(3, EntryType::DirectAccept, Some(9), Some(1)),
            entry(4, EntryType::DirectAccept, Some(2), None),
        ];
        let order: Vec<EntryId> = main_draw_pool(&entries, &[]).iter().map(|e| e.id).collect();
        assert_eq!(order, vec![3, 4, 1, 2]);
    }

    #[test]
    fn pool_admits_only_qualification_winners() {
        let mut entries = vec![
            entry(1, EntryType::DirectAccept, Some(1), None),
            entry(2, EntryType::Qualifier, Some(40), None),
            entry(3, EntryType::QualWildcard, Some(50), None),
            entry(4, EntryType::LuckyLoser, Some(30), None),
            entry(5, EntryType::Alternate, Some(20), None),
        ];
        entries.push(TournamentEntry {
            status: EntryStatus::Withdrawn,
            ..entry(6, EntryType::DirectAccept, Some(2), None)
        });
        let finals = vec![qual_final(2, 3, Some(3))];
        let order: Vec<EntryId> = main_draw_pool(&entries, &finals).iter().map(|e| e.id).collect();
        assert_eq!(order, vec![1, 3]);
    }
}
