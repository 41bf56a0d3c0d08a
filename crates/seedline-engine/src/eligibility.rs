// Eligibility gate consumed before any draw is built.

use std::collections::HashSet;

use seedline_store::{CompetitorId, SeasonId, TournamentEntry};

use crate::error::EngineError;

/// Yes/no answer from the licensing collaborator.
pub trait EligibilityGate {
    fn is_eligible(&self, competitor_id: CompetitorId, season_id: SeasonId) -> bool;
}

/// Gate that lets everyone through.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl EligibilityGate for AllowAll {
    fn is_eligible(&self, _competitor_id: CompetitorId, _season_id: SeasonId) -> bool {
        true
    }
}

/// Gate backed by a fixed set of ineligible competitors.
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    denied: HashSet<CompetitorId>,
}

impl DenyList {
    pub fn new(denied: impl IntoIterator<Item = CompetitorId>) -> Self {
        DenyList {
            denied: denied.into_iter().collect(),
        }
    }
}

impl EligibilityGate for DenyList {
    fn is_eligible(&self, competitor_id: CompetitorId, _season_id: SeasonId) -> bool {
        !self.denied.contains(&competitor_id)
    }
}

impl<F> EligibilityGate for F
where
    F: Fn(CompetitorId, SeasonId) -> bool,
{
    fn is_eligible(&self, competitor_id: CompetitorId, season_id: SeasonId) -> bool {
        self(competitor_id, season_id)
    }
}

/// Check every active entry and report all failures at once.
pub(crate) fn check_entries<G: EligibilityGate + ?Sized>(
    gate: &G,
    season_id: SeasonId,
    entries: &[TournamentEntry],
) -> Result<(), EngineError> {
    let mut failed: Vec<CompetitorId> = entries
        .iter()
        .filter(|e| e.is_active() && !gate.is_eligible(e.competitor_id, season_id))
        .map(|e| e.competitor_id)
        .collect();
    if failed.is_empty() {
        return Ok(());
    }
    failed.sort_unstable();
    failed.dedup();
    Err(EngineError::Eligibility { competitors: failed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedline_store::{EntryStatus, EntryType};

    fn entry(id: i64, competitor_id: CompetitorId, status: EntryStatus) -> TournamentEntry {
        TournamentEntry {
            id,
            tournament_id: 1,
            competitor_id,
            entry_type: EntryType::DirectAccept,
            status,
            world_ranking: None,
            seed_number: None,
            position: None,
            registration_rank: None,
        }
    }

    #[test]
    fn all_failures_reported_together() {
        let gate = DenyList::new([7, 3]);
        let entries = vec![
            entry(1, 7, EntryStatus::Active),
            entry(2, 5, EntryStatus::Active),
            entry(3, 3, EntryStatus::Active),
        ];
        match check_entries(&gate, 1, &entries).unwrap_err() {
            EngineError::Eligibility { competitors } => assert_eq!(competitors, vec![3, 7]),
            other => panic!("expected Eligibility, got: {other}"),
        }
    }

    #[test]
    fn withdrawn_entries_are_not_checked() {
        let gate = DenyList::new([7]);
        let entries = vec![entry(1, 7, EntryStatus::Withdrawn)];
        assert!(check_entries(&gate, 1, &entries).is_ok());
    }

    #[test]
    fn closures_act_as_gates() {
        let gate = |competitor: CompetitorId, season: SeasonId| competitor != season;
        assert!(gate.is_eligible(1, 2));
        assert!(!EligibilityGate::is_eligible(&gate, 2, 2));
        assert!(AllowAll.is_eligible(1, 1));
    }
}
