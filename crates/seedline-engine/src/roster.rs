// Lucky losers, alternates and manual slot edits in the main draw.

use serde::Serialize;
use tracing::{debug, info};

use seedline_core::roster::{
    is_prefix_placed, pick_vacancy_filler, plan_prefix_repairs, worst_placed, FillSource,
    PrefixRepair, RosterCandidate,
};
use seedline_store::rows;
use seedline_store::{
    EntryId, EntryStatus, EntryType, Match, Phase, TournamentEntry, TournamentId,
    TournamentState,
};

use crate::bracket::{
    ensure_playable_main_slot, ensure_slot_undecided, ensure_state, occupants,
    sync_first_round_pair,
};
use crate::eligibility::{check_entries, EligibilityGate};
use crate::error::EngineError;
use crate::qualification::decided_finals;
use crate::Engine;

/// Result of filling a vacancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FillOutcome {
    Filled {
        entry_id: EntryId,
        source: FillSource,
    },
    /// The slot was already taken; nothing changed.
    AlreadyOccupied { entry_id: EntryId },
}

/// Result of reinstating a withdrawn entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReinstateOutcome {
    pub entry_id: EntryId,
    pub slot: u32,
    /// Lucky loser that gave up the slot, if any.
    pub evicted: Option<EntryId>,
}

fn candidates(entries: &[TournamentEntry], entry_type: EntryType) -> Vec<RosterCandidate> {
    entries
        .iter()
        .filter(|e| e.is_active() && e.entry_type == entry_type)
        .map(|e| RosterCandidate {
            id: e.id,
            world_ranking: e.world_ranking,
            position: e.main_draw_position(),
        })
        .collect()
}

fn find_entry(entries: &[TournamentEntry], id: EntryId) -> Result<&TournamentEntry, EngineError> {
    entries
        .iter()
        .find(|e| e.id == id)
        .ok_or(EngineError::NotFound { what: "entry", id })
}

const MAIN_DRAW_LIVE: &[TournamentState] = &[TournamentState::MainDraw];

impl<G: EligibilityGate> Engine<G> {
    /// Fill an empty main-draw slot with the next lucky loser, else the
    /// best alternate.
    pub fn fill_vacant_slot(
        &self,
        tournament_id: TournamentId,
        slot: u32,
    ) -> Result<FillOutcome, EngineError> {
        self.db.write(|tx| {
            let tournament = rows::load_tournament(tx, tournament_id)?;
            ensure_state(&tournament, MAIN_DRAW_LIVE, "filling a vacancy")?;
            ensure_playable_main_slot(&tournament, slot)?;

            let mut entries = rows::load_entries(tx, tournament_id)?;
            let mut placed = occupants(&entries);
            if let Some(&entry_id) = placed.get(&slot) {
                debug!(tournament_id, slot, entry_id, "slot already occupied");
                return Ok(FillOutcome::AlreadyOccupied { entry_id });
            }

            let mut matches = rows::load_matches(tx, tournament_id, Some(Phase::MainDraw))?;
            ensure_slot_undecided(&tournament, &matches, slot)?;

            let lucky_losers = candidates(&entries, EntryType::LuckyLoser);
            let alternates = candidates(&entries, EntryType::Alternate);
            let Some((entry_id, source)) = pick_vacancy_filler(&lucky_losers, &alternates) else {
                return Err(EngineError::Capacity {
                    what: "lucky losers or alternates".into(),
                    needed: 1,
                    available: 0,
                });
            };

            let entry = entries
                .iter_mut()
                .find(|e| e.id == entry_id)
                .ok_or(EngineError::NotFound { what: "entry", id: entry_id })?;
            check_entries(&self.gate, tournament.season_id, std::slice::from_ref(entry))?;
            entry.position = Some(slot);
            rows::update_entry(tx, entry)?;
            placed.insert(slot, entry_id);
            sync_first_round_pair(tx, &tournament, &mut matches, &placed, slot)?;

            info!(tournament_id, slot, entry_id, ?source, "vacancy filled");
            Ok(FillOutcome::Filled { entry_id, source })
        })
    }

    /// Make the placed lucky losers exactly the head of the queue again.
    /// Each evicted lucky loser hands its slot to the best missing one.
    pub fn enforce_ll_prefix_in_md(
        &self,
        tournament_id: TournamentId,
    ) -> Result<Vec<PrefixRepair>, EngineError> {
        self.db.write(|tx| {
            let tournament = rows::load_tournament(tx, tournament_id)?;
            ensure_state(&tournament, MAIN_DRAW_LIVE, "lucky-loser prefix repair")?;
            let entries = rows::load_entries(tx, tournament_id)?;
            let mut matches = rows::load_matches(tx, tournament_id, Some(Phase::MainDraw))?;

            let lucky_losers = candidates(&entries, EntryType::LuckyLoser);
            let repairs = plan_prefix_repairs(&lucky_losers);
            if repairs.is_empty() {
                return Ok(repairs);
            }

            let mut updates = Vec::with_capacity(repairs.len() * 2);
            let mut replacements = Vec::with_capacity(repairs.len());
            for repair in &repairs {
                ensure_slot_undecided(&tournament, &matches, repair.slot)?;
                let evicted = find_entry(&entries, repair.evicted)?;
                let replacement = find_entry(&entries, repair.replacement)?;
                updates.push(TournamentEntry {
                    position: None,
                    ..evicted.clone()
                });
                updates.push(TournamentEntry {
                    position: Some(repair.slot),
                    ..replacement.clone()
                });
                replacements.push(replacement.clone());
            }
            check_entries(&self.gate, tournament.season_id, &replacements)?;
            rows::update_entries(tx, &updates)?;

            let entries = rows::load_entries(tx, tournament_id)?;
            let placed = occupants(&entries);
            for repair in &repairs {
                sync_first_round_pair(tx, &tournament, &mut matches, &placed, repair.slot)?;
            }
            debug_assert!(is_prefix_placed(&candidates(&entries, EntryType::LuckyLoser)));

            info!(tournament_id, repairs = repairs.len(), "lucky-loser prefix restored");
            Ok(repairs)
        })
    }

    /// Bring a withdrawn original entry back into the main draw.
    ///
    /// It takes `target_slot` when that slot is empty; otherwise the worst
    /// placed lucky loser is evicted and its slot is used.
    pub fn reinstate_entry(
        &self,
        entry_id: EntryId,
        target_slot: Option<u32>,
    ) -> Result<ReinstateOutcome, EngineError> {
        self.db.write(|tx| {
            let mut entry = rows::load_entry(tx, entry_id)?;
            let tournament = rows::load_tournament(tx, entry.tournament_id)?;
            ensure_state(&tournament, MAIN_DRAW_LIVE, "reinstatement")?;
            if entry.status != EntryStatus::Withdrawn {
                return Err(EngineError::conflict(format!(
                    "entry {entry_id} is not withdrawn"
                )));
            }
            if matches!(entry.entry_type, EntryType::LuckyLoser | EntryType::Alternate) {
                return Err(EngineError::conflict(format!(
                    "entry {entry_id} is a {} and cannot be reinstated",
                    entry.entry_type.as_str()
                )));
            }
            check_entries(
                &self.gate,
                tournament.season_id,
                std::slice::from_ref(&TournamentEntry {
                    status: EntryStatus::Active,
                    ..entry.clone()
                }),
            )?;

            let entries = rows::load_entries(tx, tournament.id)?;
            let mut matches = rows::load_matches(tx, tournament.id, Some(Phase::MainDraw))?;
            let mut placed = occupants(&entries);

            let free_target = match target_slot {
                Some(slot) => {
                    ensure_playable_main_slot(&tournament, slot)?;
                    (!placed.contains_key(&slot)).then_some(slot)
                }
                None => None,
            };

            let mut updates = Vec::new();
            let (slot, evicted) = match free_target {
                Some(slot) => (slot, None),
                None => {
                    let worst = worst_placed(&candidates(&entries, EntryType::LuckyLoser))
                        .ok_or_else(|| EngineError::Capacity {
                            what: "placed lucky losers to evict".into(),
                            needed: 1,
                            available: 0,
                        })?;
                    let slot = worst.position.ok_or_else(|| {
                        EngineError::conflict(format!("lucky loser {} has no slot", worst.id))
                    })?;
                    let evicted = find_entry(&entries, worst.id)?;
                    updates.push(TournamentEntry {
                        position: None,
                        ..evicted.clone()
                    });
                    placed.remove(&slot);
                    (slot, Some(worst.id))
                }
            };
            ensure_slot_undecided(&tournament, &matches, slot)?;

            entry.status = EntryStatus::Active;
            entry.position = Some(slot);
            if let Some(seed) = entry.seed_number {
                if entries
                    .iter()
                    .any(|e| e.id != entry_id && e.is_active() && e.seed_number == Some(seed))
                {
                    debug!(entry_id, seed, "seed number taken; reinstated unseeded");
                    entry.seed_number = None;
                }
            }
            updates.push(entry.clone());
            rows::update_entries(tx, &updates)?;

            placed.insert(slot, entry_id);
            sync_first_round_pair(tx, &tournament, &mut matches, &placed, slot)?;

            info!(
                tournament_id = tournament.id,
                entry_id,
                slot,
                evicted = ?evicted,
                "entry reinstated"
            );
            Ok(ReinstateOutcome {
                entry_id,
                slot,
                evicted,
            })
        })
    }

    /// Withdraw an entry, release its slot and drop its seed number.
    /// Repeating it is a no-op.
    pub fn withdraw_entry(&self, entry_id: EntryId) -> Result<TournamentEntry, EngineError> {
        self.db.write(|tx| {
            let mut entry = rows::load_entry(tx, entry_id)?;
            if entry.status == EntryStatus::Withdrawn {
                return Ok(entry);
            }
            if entry.status == EntryStatus::Replaced {
                return Err(EngineError::conflict(format!(
                    "entry {entry_id} was replaced and cannot be withdrawn"
                )));
            }
            let tournament = rows::load_tournament(tx, entry.tournament_id)?;
            let mut matches = rows::load_matches(tx, tournament.id, None)?;

            let released = entry.position;
            if let Some(slot) = released {
                ensure_slot_undecided(&tournament, &matches, slot)?;
            }
            entry.status = EntryStatus::Withdrawn;
            entry.position = None;
            entry.seed_number = None;
            rows::update_entry(tx, &entry)?;

            if let Some(slot) = released {
                let entries = rows::load_entries(tx, tournament.id)?;
                sync_first_round_pair(tx, &tournament, &mut matches, &occupants(&entries), slot)?;
            }

            info!(tournament_id = tournament.id, entry_id, slot = ?released, "entry withdrawn");
            Ok(entry)
        })
    }

    /// Manually place an unplaced active entry into an empty main-draw slot.
    pub fn place_entry(&self, entry_id: EntryId, slot: u32) -> Result<TournamentEntry, EngineError> {
        self.db.write(|tx| {
            let mut entry = rows::load_entry(tx, entry_id)?;
            let tournament = rows::load_tournament(tx, entry.tournament_id)?;
            ensure_state(&tournament, MAIN_DRAW_LIVE, "manual placement")?;
            if !entry.is_active() {
                return Err(EngineError::conflict(format!("entry {entry_id} is not active")));
            }
            if let Some(current) = entry.main_draw_position() {
                return Err(EngineError::conflict(format!(
                    "entry {entry_id} already holds slot {current}"
                )));
            }
            ensure_playable_main_slot(&tournament, slot)?;

            let entries = rows::load_entries(tx, tournament.id)?;
            let mut placed = occupants(&entries);
            if let Some(occupant) = placed.get(&slot) {
                return Err(EngineError::conflict(format!(
                    "slot {slot} is occupied by entry {occupant}"
                )));
            }
            let mut matches = rows::load_matches(tx, tournament.id, Some(Phase::MainDraw))?;
            ensure_slot_undecided(&tournament, &matches, slot)?;
            check_entries(&self.gate, tournament.season_id, std::slice::from_ref(&entry))?;

            entry.position = Some(slot);
            rows::update_entry(tx, &entry)?;
            placed.insert(slot, entry_id);
            sync_first_round_pair(tx, &tournament, &mut matches, &placed, slot)?;

            info!(tournament_id = tournament.id, entry_id, slot, "entry placed");
            Ok(entry)
        })
    }

    /// Exchange the occupants of two main-draw slots. Either slot may be
    /// empty, but not a bye.
    pub fn swap_slots(
        &self,
        tournament_id: TournamentId,
        a: u32,
        b: u32,
    ) -> Result<Vec<Match>, EngineError> {
        self.db.write(|tx| {
            let tournament = rows::load_tournament(tx, tournament_id)?;
            ensure_state(&tournament, MAIN_DRAW_LIVE, "slot swap")?;
            ensure_playable_main_slot(&tournament, a)?;
            ensure_playable_main_slot(&tournament, b)?;
            let mut matches = rows::load_matches(tx, tournament_id, Some(Phase::MainDraw))?;
            if a == b {
                return Ok(Vec::new());
            }
            ensure_slot_undecided(&tournament, &matches, a)?;
            ensure_slot_undecided(&tournament, &matches, b)?;

            let entries = rows::load_entries(tx, tournament_id)?;
            let mut placed = occupants(&entries);
            let (at_a, at_b) = (placed.remove(&a), placed.remove(&b));

            let mut updates = Vec::new();
            if let Some(id) = at_a {
                updates.push(TournamentEntry {
                    position: Some(b),
                    ..find_entry(&entries, id)?.clone()
                });
                placed.insert(b, id);
            }
            if let Some(id) = at_b {
                updates.push(TournamentEntry {
                    position: Some(a),
                    ..find_entry(&entries, id)?.clone()
                });
                placed.insert(a, id);
            }
            rows::update_entries(tx, &updates)?;

            let mut touched = Vec::new();
            for slot in [a, b] {
                if let Some(id) = sync_first_round_pair(tx, &tournament, &mut matches, &placed, slot)? {
                    touched.push(id);
                }
            }
            touched.dedup();

            info!(tournament_id, a, b, "slots swapped");
            Ok(matches
                .into_iter()
                .filter(|m| touched.contains(&m.id))
                .collect())
        })
    }

    /// Turn the losers of decided qualification finals into lucky losers.
    /// Already converted entries are skipped.
    pub fn designate_lucky_losers(
        &self,
        tournament_id: TournamentId,
    ) -> Result<Vec<EntryId>, EngineError> {
        self.db.write(|tx| {
            let tournament = rows::load_tournament(tx, tournament_id)?;
            if !tournament.has_qualification() {
                return Err(EngineError::configuration(
                    "qualifier_count",
                    "tournament has no qualification brackets",
                ));
            }
            let entries = rows::load_entries(tx, tournament_id)?;
            let matches = rows::load_matches(tx, tournament_id, Some(Phase::Qualification))?;

            let mut converted = Vec::new();
            for m in decided_finals(&matches) {
                let loser = match (m.winner_entry_id, m.pairing()) {
                    (Some(w), (Some(top), Some(bottom))) if w == top => bottom,
                    (Some(w), (Some(top), Some(bottom))) if w == bottom => top,
                    _ => continue,
                };
                let entry = find_entry(&entries, loser)?;
                if entry.is_active() && entry.entry_type.is_qualifying() {
                    let mut entry = entry.clone();
                    entry.entry_type = EntryType::LuckyLoser;
                    rows::update_entry(tx, &entry)?;
                    converted.push(loser);
                }
            }

            info!(tournament_id, converted = converted.len(), "lucky losers designated");
            Ok(converted)
        })
    }
}
