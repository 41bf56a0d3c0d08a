// Registration recalculation preview/confirm, brutal reset and main-draw reopen.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use seedline_core::planner::{
    classify, EntryGroup, PlannerCandidate, PlannerLimits, Promotion,
};
use seedline_core::qualification_bracket_size;
use seedline_store::rows;
use seedline_store::{
    CompetitorId, EntryId, EntryType, Phase, SnapshotKind, StoreError, Tournament,
    TournamentEntry, TournamentId, TournamentState,
};

use crate::bracket::{effective_seed_count, ensure_state};
use crate::eligibility::EligibilityGate;
use crate::error::EngineError;
use crate::{snapshot, Engine};

/// Planned outcome for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedEntry {
    pub entry_id: EntryId,
    pub competitor_id: CompetitorId,
    pub world_ranking: Option<u32>,
    pub group: EntryGroup,
    pub seed_number: Option<u32>,
    pub registration_rank: u32,
    /// Entry type written on confirmation.
    pub entry_type_after: EntryType,
}

/// Read-only classification of the current registrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalcPreview {
    pub tournament_id: TournamentId,
    /// Hash of the entry set the preview was computed from.
    pub fingerprint: String,
    pub placements: Vec<PlannedEntry>,
}

impl RecalcPreview {
    pub fn group(&self, group: EntryGroup) -> impl Iterator<Item = &PlannedEntry> {
        self.placements.iter().filter(move |p| p.group == group)
    }
}

/// SHA-256 over the fields the classification depends on, hex encoded.
fn fingerprint(entries: &[TournamentEntry]) -> Result<String, EngineError> {
    let mut keyed: Vec<_> = entries
        .iter()
        .map(|e| (e.id, e.competitor_id, e.entry_type, e.status, e.world_ranking))
        .collect();
    keyed.sort_by_key(|k| k.0);
    let bytes = serde_json::to_vec(&keyed).map_err(StoreError::from)?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn limits(tournament: &Tournament, seeds: usize) -> Result<PlannerLimits, EngineError> {
    let direct_accept = tournament
        .draw_size
        .checked_sub(tournament.qualifier_count)
        .ok_or_else(|| {
            EngineError::configuration(
                "qualifier_count",
                format!(
                    "{} qualifiers do not fit a draw of {}",
                    tournament.qualifier_count, tournament.draw_size
                ),
            )
        })?;
    let qualifier = if tournament.has_qualification() {
        let size = qualification_bracket_size(tournament.qual_rounds)?;
        tournament.qualifier_count.checked_mul(size).ok_or_else(|| {
            EngineError::configuration("qualifier_count", "qualification capacity overflows")
        })?
    } else {
        0
    };
    Ok(PlannerLimits {
        seeds,
        direct_accept: direct_accept as usize,
        qualifier: qualifier as usize,
    })
}

/// Entry type an entry gets for its group. Wildcards keep their kind.
fn type_for_group(current: EntryType, group: EntryGroup) -> EntryType {
    match group {
        EntryGroup::Seed | EntryGroup::DirectAccept => match current {
            EntryType::Wildcard => EntryType::Wildcard,
            _ => EntryType::DirectAccept,
        },
        EntryGroup::Qualifier => match current {
            EntryType::QualWildcard => EntryType::QualWildcard,
            _ => EntryType::Qualifier,
        },
        EntryGroup::Reserve => EntryType::Alternate,
    }
}

fn plan(
    tournament: &Tournament,
    entries: &[TournamentEntry],
    seeds: usize,
) -> Result<RecalcPreview, EngineError> {
    let candidates: Vec<PlannerCandidate> = entries
        .iter()
        .filter(|e| e.is_active() && e.entry_type != EntryType::LuckyLoser)
        .map(|e| PlannerCandidate {
            entry_id: e.id,
            world_ranking: e.world_ranking,
            promotion: match e.entry_type {
                EntryType::Wildcard => Promotion::MainDraw,
                EntryType::QualWildcard => Promotion::Qualifying,
                _ => Promotion::None,
            },
        })
        .collect();
    let by_id: HashMap<EntryId, &TournamentEntry> = entries.iter().map(|e| (e.id, e)).collect();

    let placements = classify(&candidates, limits(tournament, seeds)?)?
        .into_iter()
        .filter_map(|p| {
            by_id.get(&p.entry_id).map(|e| PlannedEntry {
                entry_id: e.id,
                competitor_id: e.competitor_id,
                world_ranking: e.world_ranking,
                group: p.group,
                seed_number: p.seed_number,
                registration_rank: p.registration_rank,
                entry_type_after: type_for_group(e.entry_type, p.group),
            })
        })
        .collect();

    Ok(RecalcPreview {
        tournament_id: tournament.id,
        fingerprint: fingerprint(entries)?,
        placements,
    })
}

impl<G: EligibilityGate> Engine<G> {
    /// Classify the current registrations without changing anything.
    pub fn preview_recalculate(
        &self,
        tournament_id: TournamentId,
    ) -> Result<RecalcPreview, EngineError> {
        self.db.read(|conn| {
            let tournament = rows::load_tournament(conn, tournament_id)?;
            let entries = rows::load_entries(conn, tournament_id)?;
            let seeds = effective_seed_count(&tournament, &self.config.seeding)?;
            plan(&tournament, &entries, seeds)
        })
    }

    /// Apply a preview, provided the entries have not changed since it was
    /// computed.
    pub fn confirm_recalculate(
        &self,
        tournament_id: TournamentId,
        preview: &RecalcPreview,
    ) -> Result<Vec<TournamentEntry>, EngineError> {
        self.db.write(|tx| {
            let tournament = rows::load_tournament(tx, tournament_id)?;
            ensure_state(&tournament, &[TournamentState::Registration], "recalculation")?;
            if preview.tournament_id != tournament_id {
                return Err(EngineError::conflict(format!(
                    "preview belongs to tournament {}",
                    preview.tournament_id
                )));
            }
            let entries = rows::load_entries(tx, tournament_id)?;
            if fingerprint(&entries)? != preview.fingerprint {
                return Err(EngineError::conflict(
                    "entries changed since the preview was computed",
                ));
            }

            let planned: HashMap<EntryId, &PlannedEntry> =
                preview.placements.iter().map(|p| (p.entry_id, p)).collect();
            let updated: Vec<TournamentEntry> = entries
                .iter()
                .filter_map(|e| {
                    planned.get(&e.id).map(|p| TournamentEntry {
                        entry_type: p.entry_type_after,
                        seed_number: p.seed_number,
                        registration_rank: Some(p.registration_rank),
                        ..e.clone()
                    })
                })
                .collect();
            rows::update_entries(tx, &updated)?;

            snapshot::capture(tx, tournament_id, SnapshotKind::Recalculate, self.config.snapshots)?;

            info!(
                tournament_id,
                entries = updated.len(),
                seeds = preview.group(EntryGroup::Seed).count(),
                "recalculation confirmed"
            );
            Ok(updated)
        })
    }

    /// Discard every match and slot/seed assignment and return to
    /// registration. Entry rows survive; the prior state is snapshotted
    /// first.
    pub fn brutal_reset(&self, tournament_id: TournamentId) -> Result<Tournament, EngineError> {
        self.db.write(|tx| {
            let mut tournament = rows::load_tournament(tx, tournament_id)?;
            snapshot::capture(tx, tournament_id, SnapshotKind::BrutalReset, self.config.snapshots)?;

            let deleted = rows::delete_matches(tx, tournament_id, None)?;
            let cleared: Vec<TournamentEntry> = rows::load_entries(tx, tournament_id)?
                .into_iter()
                .filter(|e| e.position.is_some() || e.seed_number.is_some())
                .map(|e| TournamentEntry {
                    position: None,
                    seed_number: None,
                    ..e
                })
                .collect();
            rows::update_entries(tx, &cleared)?;

            tournament.state = TournamentState::Registration;
            tournament.rng_seed_active = None;
            tournament.bye_slots.clear();
            rows::update_tournament_progress(tx, &tournament)?;

            warn!(
                tournament_id,
                matches = deleted,
                entries = cleared.len(),
                "tournament brutally reset"
            );
            Ok(tournament)
        })
    }

    /// Drop the main draw and go back to qualification, or to registration
    /// when there is none.
    pub fn reopen_main_draw(&self, tournament_id: TournamentId) -> Result<Tournament, EngineError> {
        self.db.write(|tx| {
            let mut tournament = rows::load_tournament(tx, tournament_id)?;
            ensure_state(
                &tournament,
                &[TournamentState::MainDraw, TournamentState::Complete],
                "reopening the main draw",
            )?;
            snapshot::capture(tx, tournament_id, SnapshotKind::Reopen, self.config.snapshots)?;

            let deleted = rows::delete_matches(tx, tournament_id, Some(Phase::MainDraw))?;
            let cleared: Vec<TournamentEntry> = rows::load_entries(tx, tournament_id)?
                .into_iter()
                .filter(|e| e.main_draw_position().is_some())
                .map(|e| TournamentEntry {
                    position: None,
                    ..e
                })
                .collect();
            rows::update_entries(tx, &cleared)?;

            tournament.state = if tournament.has_qualification() {
                TournamentState::Qualification
            } else {
                TournamentState::Registration
            };
            tournament.bye_slots.clear();
            rows::update_tournament_progress(tx, &tournament)?;

            info!(
                tournament_id,
                matches = deleted,
                state = tournament.state.as_str(),
                "main draw reopened"
            );
            Ok(tournament)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedline_core::ScoringRules;
    use seedline_store::EntryStatus;

    fn tournament(draw_size: u32, qualifier_count: u32, qual_rounds: u32) -> Tournament {
        Tournament {
            id: 1,
            name: "Open".into(),
            category_id: 1,
            season_id: 1,
            draw_size,
            seed_count: None,
            qualifier_count,
            qual_rounds,
            state: TournamentState::Registration,
            rng_seed_active: None,
            bye_slots: Default::default(),
            md_scoring: ScoringRules::default(),
            qual_scoring: ScoringRules::default(),
            created_at: String::new(),
        }
    }

    fn entry(id: EntryId, entry_type: EntryType, ranking: Option<u32>) -> TournamentEntry {
        TournamentEntry {
            id,
            tournament_id: 1,
            competitor_id: 100 + id,
            entry_type,
            status: EntryStatus::Active,
            world_ranking: ranking,
            seed_number: None,
            position: None,
            registration_rank: None,
        }
    }

    #[test]
    fn limits_follow_draw_and_qualification() {
        let l = limits(&tournament(32, 4, 2), 8).unwrap();
        assert_eq!((l.seeds, l.direct_accept, l.qualifier), (8, 28, 16));
        assert_eq!(limits(&tournament(16, 0, 0), 4).unwrap().qualifier, 0);
        assert!(limits(&tournament(4, 8, 1), 1).is_err());
    }

    #[test]
    fn limits_reject_unsupported_qualifying_rounds() {
        for rounds in [5, 32, 40] {
            assert!(matches!(
                limits(&tournament(32, 4, rounds), 8),
                Err(EngineError::Configuration { .. })
            ));
        }
    }

    #[test]
    fn plan_rewrites_types_by_group() {
        // Draw of 4 with one qualifier: 3 direct places, 2 qualifying places.
        let entries = vec![
            entry(1, EntryType::DirectAccept, Some(1)),
            entry(2, EntryType::Alternate, Some(2)),
            entry(3, EntryType::Wildcard, Some(90)),
            entry(4, EntryType::DirectAccept, Some(3)),
            entry(5, EntryType::QualWildcard, None),
            entry(6, EntryType::Qualifier, Some(50)),
            entry(7, EntryType::LuckyLoser, Some(4)),
            entry(8, EntryType::DirectAccept, Some(60)),
        ];
        let preview = plan(&tournament(4, 1, 1), &entries, 1).unwrap();
        let by_id: HashMap<EntryId, &PlannedEntry> =
            preview.placements.iter().map(|p| (p.entry_id, p)).collect();

        assert!(!by_id.contains_key(&7));
        assert_eq!(by_id[&1].group, EntryGroup::Seed);
        assert_eq!(by_id[&1].seed_number, Some(1));
        assert_eq!(by_id[&2].entry_type_after, EntryType::DirectAccept);
        assert_eq!(by_id[&3].entry_type_after, EntryType::Wildcard);
        assert_eq!(by_id[&4].group, EntryGroup::Qualifier);
        assert_eq!(by_id[&4].entry_type_after, EntryType::Qualifier);
        assert_eq!(by_id[&5].entry_type_after, EntryType::QualWildcard);
        assert_eq!(by_id[&6].group, EntryGroup::Reserve);
        assert_eq!(by_id[&8].entry_type_after, EntryType::Alternate);

        let mut ranks: Vec<u32> = preview.placements.iter().map(|p| p.registration_rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, (1..=7).collect::<Vec<u32>>());
    }

    #[test]
    fn fingerprint_tracks_entry_changes() {
        let mut entries = vec![
            entry(1, EntryType::DirectAccept, Some(1)),
            entry(2, EntryType::DirectAccept, Some(2)),
        ];
        let before = fingerprint(&entries).unwrap();
        assert_eq!(before.len(), 64);
        entries.reverse();
        assert_eq!(fingerprint(&entries).unwrap(), before);
        entries[0].status = EntryStatus::Withdrawn;
        assert_ne!(fingerprint(&entries).unwrap(), before);
    }
}
