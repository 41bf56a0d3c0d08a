// Shared bracket state helpers: slot occupancy and first-round pair sync.

use std::collections::BTreeMap;

use rusqlite::Connection;
use tracing::debug;

use seedline_core::anchors::is_band_boundary;
use seedline_core::rounds::{join_slot, main_draw_round_name, pair_of, qualifying_round_name, split_slot};
use seedline_core::{qualification_bracket_size, template_size};
use seedline_store::config::SeedingConfig;
use seedline_store::rows;
use seedline_store::{
    EntryId, Match, MatchId, NewMatch, Phase, Tournament, TournamentEntry, TournamentState,
};

use crate::error::EngineError;

/// Slot to entry for every active, placed entry (main draw and
/// qualification slots alike).
pub(crate) fn occupants(entries: &[TournamentEntry]) -> BTreeMap<u32, EntryId> {
    entries
        .iter()
        .filter(|e| e.is_active())
        .filter_map(|e| e.position.map(|p| (p, e.id)))
        .collect()
}

/// Slots in the first round of `phase`.
pub(crate) fn first_round_size(tournament: &Tournament, phase: Phase) -> Result<u32, EngineError> {
    match phase {
        Phase::MainDraw => Ok(template_size(tournament.draw_size)?),
        Phase::Qualification => {
            if tournament.qual_rounds == 0 {
                return Err(EngineError::configuration(
                    "qual_rounds",
                    "tournament has no qualification rounds",
                ));
            }
            Ok(qualification_bracket_size(tournament.qual_rounds)?)
        }
    }
}

/// Name of the round with `round_size` slots in `phase`.
pub(crate) fn round_name(tournament: &Tournament, phase: Phase, round_size: u32) -> String {
    match phase {
        Phase::MainDraw => main_draw_round_name(round_size),
        Phase::Qualification => {
            // Q1 is the 2^R round, Q2 the next, ...
            let depth = tournament.qual_rounds + 1 - round_size.trailing_zeros();
            qualifying_round_name(depth)
        }
    }
}

/// Phase a stored slot belongs to.
pub(crate) fn phase_of_slot(slot: u32) -> Phase {
    if split_slot(slot).0 == 0 {
        Phase::MainDraw
    } else {
        Phase::Qualification
    }
}

/// The first-round match covering `slot`, if it exists.
pub(crate) fn first_round_match<'a>(
    matches: &'a [Match],
    phase: Phase,
    round_size: u32,
    slot: u32,
) -> Option<&'a Match> {
    matches
        .iter()
        .find(|m| m.phase == phase && m.round_size == round_size && m.side_of_slot(slot).is_some())
}

/// Refuse to touch a slot whose first-round match already has a result.
pub(crate) fn ensure_slot_undecided(
    tournament: &Tournament,
    matches: &[Match],
    slot: u32,
) -> Result<(), EngineError> {
    let phase = phase_of_slot(slot);
    let size = first_round_size(tournament, phase)?;
    match first_round_match(matches, phase, size, slot) {
        Some(m) if m.has_result() => Err(EngineError::conflict(format!(
            "slot {slot} belongs to decided match {}",
            m.id
        ))),
        _ => Ok(()),
    }
}

/// Main-draw slot must exist in the template and not be a bye.
pub(crate) fn ensure_playable_main_slot(tournament: &Tournament, slot: u32) -> Result<(), EngineError> {
    let template = template_size(tournament.draw_size)?;
    if slot == 0 || slot > template {
        return Err(EngineError::conflict(format!(
            "slot {slot} is outside the {template}-slot main draw"
        )));
    }
    if tournament.bye_slots.contains(&slot) {
        return Err(EngineError::conflict(format!("slot {slot} is a bye")));
    }
    Ok(())
}

/// Make the first-round match of `slot`'s pair reflect `occupants`.
///
/// An existing match gets its competitor references rewritten in place and
/// loses its schedule when the pairing changed; a decided match is a
/// conflict. A missing match is created once both sides are filled.
pub(crate) fn sync_first_round_pair(
    conn: &Connection,
    tournament: &Tournament,
    matches: &mut Vec<Match>,
    occupants: &BTreeMap<u32, EntryId>,
    slot: u32,
) -> Result<Option<MatchId>, EngineError> {
    let phase = phase_of_slot(slot);
    let size = first_round_size(tournament, phase)?;
    let (group, local) = split_slot(slot);
    let (top_local, bottom_local) = pair_of(local);
    let (top, bottom) = (join_slot(group, top_local), join_slot(group, bottom_local));
    let pairing = (occupants.get(&top).copied(), occupants.get(&bottom).copied());

    if let Some(m) = matches
        .iter_mut()
        .find(|m| m.phase == phase && m.round_size == size && m.slot_top == top)
    {
        if m.pairing() == pairing {
            return Ok(Some(m.id));
        }
        if m.has_result() {
            return Err(EngineError::conflict(format!(
                "match {} already has a result",
                m.id
            )));
        }
        m.top_entry_id = pairing.0;
        m.bottom_entry_id = pairing.1;
        rows::update_match(conn, m)?;
        rows::delete_schedule(conn, m.id)?;
        debug!(match_id = m.id, top, bottom, "first-round pairing updated");
        return Ok(Some(m.id));
    }

    if pairing.0.is_none() || pairing.1.is_none() {
        return Ok(None);
    }
    let id = rows::upsert_match(
        conn,
        tournament.id,
        &NewMatch {
            phase,
            round_name: round_name(tournament, phase, size),
            round_size: size,
            slot_top: top,
            slot_bottom: bottom,
            top_entry_id: pairing.0,
            bottom_entry_id: pairing.1,
        },
    )?;
    matches.push(rows::load_match(conn, id)?);
    debug!(match_id = id, top, bottom, "first-round match created");
    Ok(Some(id))
}

/// Seed count of a tournament: its own, else the configured fallback,
/// clamped to the largest band boundary that fits the draw.
pub(crate) fn effective_seed_count(
    tournament: &Tournament,
    seeding: &SeedingConfig,
) -> Result<usize, EngineError> {
    let requested = tournament
        .seed_count
        .unwrap_or_else(|| seeding.seeds_for_draw(tournament.draw_size));
    if !is_band_boundary(requested as usize) {
        return Err(EngineError::configuration(
            "seed_count",
            format!("must be a power of two, got {requested}"),
        ));
    }
    let mut seeds = requested;
    while seeds > tournament.draw_size {
        seeds /= 2;
    }
    Ok(seeds as usize)
}

pub(crate) fn ensure_state(
    tournament: &Tournament,
    allowed: &[TournamentState],
    operation: &str,
) -> Result<(), EngineError> {
    if allowed.contains(&tournament.state) {
        Ok(())
    } else {
        Err(EngineError::conflict(format!(
            "{operation} is not allowed while tournament {} is in state {}",
            tournament.id,
            tournament.state.as_str()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedline_core::ScoringRules;
    use seedline_store::config::SeedFallback;

    fn tournament(draw_size: u32, seed_count: Option<u32>, qual_rounds: u32) -> Tournament {
        Tournament {
            id: 1,
            name: "Test".into(),
            category_id: 1,
            season_id: 1,
            draw_size,
            seed_count,
            qualifier_count: if qual_rounds > 0 { 2 } else { 0 },
            qual_rounds,
            state: TournamentState::Registration,
            rng_seed_active: None,
            bye_slots: Default::default(),
            md_scoring: ScoringRules::default(),
            qual_scoring: ScoringRules::default(),
            created_at: String::new(),
        }
    }

    #[test]
    fn seed_count_falls_back_and_clamps() {
        let seeding = SeedingConfig::default();
        assert_eq!(effective_seed_count(&tournament(24, None, 0), &seeding).unwrap(), 8);
        assert_eq!(effective_seed_count(&tournament(16, Some(2), 0), &seeding).unwrap(), 2);

        let greedy = SeedingConfig {
            fallback: vec![SeedFallback { max_draw: 8, seeds: 8 }],
            default_seeds: 32,
        };
        assert_eq!(effective_seed_count(&tournament(6, None, 0), &greedy).unwrap(), 4);
        assert!(effective_seed_count(&tournament(16, Some(3), 0), &seeding).is_err());
    }

    #[test]
    fn round_names_per_phase() {
        let t = tournament(32, None, 3);
        assert_eq!(round_name(&t, Phase::MainDraw, 32), "R32");
        assert_eq!(round_name(&t, Phase::MainDraw, 2), "F");
        assert_eq!(round_name(&t, Phase::Qualification, 8), "Q1");
        assert_eq!(round_name(&t, Phase::Qualification, 4), "Q2");
        assert_eq!(round_name(&t, Phase::Qualification, 2), "Q3");
    }

    #[test]
    fn first_round_sizes() {
        let t = tournament(24, None, 2);
        assert_eq!(first_round_size(&t, Phase::MainDraw).unwrap(), 32);
        assert_eq!(first_round_size(&t, Phase::Qualification).unwrap(), 4);
        assert!(first_round_size(&tournament(16, None, 0), Phase::Qualification).is_err());
    }

    #[test]
    fn playable_slots() {
        let mut t = tournament(24, None, 0);
        t.bye_slots = [2].into_iter().collect();
        assert!(ensure_playable_main_slot(&t, 3).is_ok());
        assert!(ensure_playable_main_slot(&t, 2).is_err());
        assert!(ensure_playable_main_slot(&t, 33).is_err());
        assert_eq!(phase_of_slot(1003), Phase::Qualification);
    }
}
