// Result recording, winner propagation and round expansion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use seedline_core::rounds::{advance_slot, join_slot, round_pairs, split_slot};
use seedline_core::{SetScore, Side};
use seedline_store::rows;
use seedline_store::{
    EntryId, Match, MatchId, MatchState, NewMatch, Outcome, Phase, TournamentId, TournamentState,
};

use crate::bracket::{first_round_size, occupants, round_name};
use crate::eligibility::EligibilityGate;
use crate::error::EngineError;
use crate::Engine;

/// Outcomes that end a match without it being played out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialOutcome {
    Walkover,
    Retirement,
    Disqualification,
}

impl From<SpecialOutcome> for Outcome {
    fn from(outcome: SpecialOutcome) -> Self {
        match outcome {
            SpecialOutcome::Walkover => Outcome::Walkover,
            SpecialOutcome::Retirement => Outcome::Retirement,
            SpecialOutcome::Disqualification => Outcome::Disqualification,
        }
    }
}

/// How a result is declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultMode {
    /// Winner only, no score.
    WinOnly { winner: EntryId },
    /// Full set scores; the winner is derived from them.
    Sets { sets: Vec<SetScore> },
    /// Walkover, retirement or disqualification with an explicit winner
    /// and the sets played so far.
    Special {
        outcome: SpecialOutcome,
        winner: EntryId,
        sets: Vec<SetScore>,
    },
}

impl<G: EligibilityGate> Engine<G> {
    /// Record or correct the result of a match.
    ///
    /// A first result moves the winner into the next-round match when it
    /// exists. A corrected winner replaces the old one in every later match
    /// of the same bracket and flags those matches for review; their own
    /// results are left alone.
    pub fn set_result(&self, match_id: MatchId, mode: ResultMode) -> Result<Match, EngineError> {
        self.db.write(|tx| {
            let mut m = rows::load_match(tx, match_id)?;
            let mut tournament = rows::load_tournament(tx, m.tournament_id)?;
            let (Some(top), Some(bottom)) = (m.top_entry_id, m.bottom_entry_id) else {
                return Err(EngineError::conflict(format!(
                    "match {match_id} does not have both competitors yet"
                )));
            };
            let rules = tournament.scoring(m.phase);

            let explicit = |winner: EntryId| {
                if winner == top || winner == bottom {
                    Ok(winner)
                } else {
                    Err(EngineError::conflict(format!(
                        "entry {winner} does not play in match {match_id}"
                    )))
                }
            };
            let (winner, score, outcome) = match mode {
                ResultMode::WinOnly { winner } => (explicit(winner)?, Vec::new(), Outcome::Played),
                ResultMode::Sets { sets } => {
                    rules.validate()?;
                    let winner = match rules.match_winner(&sets)? {
                        Side::Top => top,
                        Side::Bottom => bottom,
                    };
                    (winner, sets, Outcome::Played)
                }
                ResultMode::Special {
                    outcome,
                    winner,
                    sets,
                } => {
                    let winner = explicit(winner)?;
                    if outcome == SpecialOutcome::Walkover && !sets.is_empty() {
                        return Err(EngineError::conflict("a walkover carries no score"));
                    }
                    rules.validate_partial(&sets)?;
                    (winner, sets, outcome.into())
                }
            };

            let previous = m.winner_entry_id;
            if previous == Some(winner) && m.score == score && m.outcome == Some(outcome) {
                return Ok(m);
            }

            m.winner_entry_id = Some(winner);
            m.score = score;
            m.outcome = Some(outcome);
            m.state = MatchState::Done;
            rows::update_match(tx, &m)?;

            let mut later: Vec<Match> = rows::load_matches(tx, m.tournament_id, Some(m.phase))?
                .into_iter()
                .filter(|other| {
                    other.round_size < m.round_size && other.bracket_group() == m.bracket_group()
                })
                .collect();

            match previous {
                None => advance_winner(tx, &m, &mut later, winner)?,
                Some(old) if old != winner => {
                    let flagged = replace_downstream(tx, &mut later, old, winner)?;
                    info!(
                        match_id,
                        old_winner = old,
                        new_winner = winner,
                        flagged,
                        "winner corrected"
                    );
                }
                Some(_) => {}
            }

            if m.phase == Phase::MainDraw && m.round_size == 2 {
                tournament.state = TournamentState::Complete;
                rows::update_tournament_progress(tx, &tournament)?;
                info!(tournament_id = tournament.id, champion = winner, "tournament complete");
            }

            debug!(match_id, winner, outcome = outcome.as_str(), "result recorded");
            Ok(m)
        })
    }

    /// Clear the review flag. Results are never re-derived.
    pub fn resolve_needs_review(&self, match_id: MatchId) -> Result<Match, EngineError> {
        self.db.write(|tx| {
            let mut m = rows::load_match(tx, match_id)?;
            if m.needs_review {
                m.needs_review = false;
                rows::update_match(tx, &m)?;
                debug!(match_id, "review resolved");
            }
            Ok(m)
        })
    }

    /// Create the next round of `phase` for every bracket whose latest
    /// round is fully decided. Main-draw bye receivers advance without a
    /// match. Returns the created match ids.
    pub fn expand_next_round(
        &self,
        tournament_id: TournamentId,
        phase: Phase,
    ) -> Result<Vec<MatchId>, EngineError> {
        self.db.write(|tx| {
            let tournament = rows::load_tournament(tx, tournament_id)?;
            let first = first_round_size(&tournament, phase)?;
            let matches = rows::load_matches(tx, tournament_id, Some(phase))?;
            let entries = rows::load_entries(tx, tournament_id)?;
            let placed = occupants(&entries);

            let mut groups: BTreeMap<u32, Vec<&Match>> = BTreeMap::new();
            for m in &matches {
                groups.entry(m.bracket_group()).or_default().push(m);
            }

            let mut created = Vec::new();
            for (group, group_matches) in groups {
                let Some(latest) = group_matches.iter().map(|m| m.round_size).min() else {
                    continue;
                };
                if latest <= 2 {
                    continue;
                }
                let current: Vec<&&Match> =
                    group_matches.iter().filter(|m| m.round_size == latest).collect();
                if let Some(open) = current.iter().find(|m| !m.has_result()) {
                    return Err(EngineError::conflict(format!(
                        "match {} of round {} is undecided",
                        open.id, open.round_name
                    )));
                }

                let advancing = |local: u32| -> Option<EntryId> {
                    let (top, bottom) = (2 * local - 1, 2 * local);
                    let slot_top = join_slot(group, top);
                    if let Some(m) = current.iter().find(|m| m.slot_top == slot_top) {
                        return m.winner_entry_id;
                    }
                    if phase == Phase::MainDraw && latest == first {
                        // Bye pair: the lone occupant goes through.
                        return placed
                            .get(&join_slot(group, top))
                            .or_else(|| placed.get(&join_slot(group, bottom)))
                            .copied();
                    }
                    None
                };

                let next_size = latest / 2;
                for (top_local, bottom_local) in round_pairs(next_size) {
                    let id = rows::upsert_match(
                        tx,
                        tournament_id,
                        &NewMatch {
                            phase,
                            round_name: round_name(&tournament, phase, next_size),
                            round_size: next_size,
                            slot_top: join_slot(group, top_local),
                            slot_bottom: join_slot(group, bottom_local),
                            top_entry_id: advancing(top_local),
                            bottom_entry_id: advancing(bottom_local),
                        },
                    )?;
                    created.push(id);
                }
                info!(
                    tournament_id,
                    phase = phase.as_str(),
                    group,
                    round = %round_name(&tournament, phase, next_size),
                    "next round created"
                );
            }
            Ok(created)
        })
    }
}

/// Put a first-time winner into the empty side of the next-round match.
fn advance_winner(
    conn: &rusqlite::Connection,
    decided: &Match,
    later: &mut [Match],
    winner: EntryId,
) -> Result<(), EngineError> {
    let (group, local_top) = split_slot(decided.slot_top);
    let (next_local, is_top) = advance_slot(local_top);
    let next_slot = join_slot(group, next_local);
    let next_size = decided.round_size / 2;

    let Some(next) = later
        .iter_mut()
        .find(|m| m.round_size == next_size && m.side_of_slot(next_slot).is_some())
    else {
        return Ok(());
    };
    let side = if is_top { Side::Top } else { Side::Bottom };
    if next.entry_on(side).is_none() {
        next.set_entry(side, Some(winner));
        rows::update_match(conn, next)?;
        debug!(match_id = next.id, winner, "winner advanced");
    }
    Ok(())
}

/// Swap `old` for `new` in every later match and flag each for review.
/// Returns how many matches were touched.
fn replace_downstream(
    conn: &rusqlite::Connection,
    later: &mut [Match],
    old: EntryId,
    new: EntryId,
) -> Result<usize, EngineError> {
    let mut touched = 0;
    for m in later.iter_mut() {
        let Some(side) = m.side_of(old) else {
            continue;
        };
        m.set_entry(side, Some(new));
        m.needs_review = true;
        rows::update_match(conn, m)?;
        rows::delete_schedule(conn, m.id)?;
        touched += 1;
    }
    Ok(touched)
}
