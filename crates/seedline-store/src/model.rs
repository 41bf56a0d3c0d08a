// Persisted rows: tournaments, entries, matches, schedules, snapshots.

use std::collections::BTreeSet;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use seedline_core::rounds::split_slot;
use seedline_core::{ScoringRules, SetScore, Side};

pub type CompetitorId = i64;
pub type SeasonId = i64;
pub type CategoryId = i64;
pub type TournamentId = i64;
pub type EntryId = i64;
pub type MatchId = i64;
pub type SnapshotId = i64;

/// Implements text-column conversion for a closed enum with `as_str` and
/// `parse`.
macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                <$ty>::parse(text).ok_or_else(|| {
                    FromSqlError::Other(format!("unknown {} `{text}`", stringify!($ty)).into())
                })
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Configuration scope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub id: CompetitorId,
    pub name: String,
    pub country: Option<String>,
}

/// Per (category, season) sizing template. Copied into every tournament
/// created from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySeason {
    pub category_id: CategoryId,
    pub season_id: SeasonId,
    pub draw_size: u32,
    /// Must be a power of two when set. `None` falls back to the configured
    /// seeding table.
    pub seed_count: Option<u32>,
    pub qualifier_count: u32,
    pub qual_rounds: u32,
    pub md_scoring: ScoringRules,
    pub qual_scoring: ScoringRules,
}

// ---------------------------------------------------------------------------
// Tournament
// ---------------------------------------------------------------------------

/// Lifecycle of a tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TournamentState {
    Registration,
    Qualification,
    MainDraw,
    Complete,
}

impl TournamentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentState::Registration => "REG",
            TournamentState::Qualification => "QUAL",
            TournamentState::MainDraw => "MD",
            TournamentState::Complete => "COMPLETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "REG" => Some(TournamentState::Registration),
            "QUAL" => Some(TournamentState::Qualification),
            "MD" => Some(TournamentState::MainDraw),
            "COMPLETE" => Some(TournamentState::Complete),
            _ => None,
        }
    }
}

sql_text_enum!(TournamentState);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub category_id: CategoryId,
    pub season_id: SeasonId,
    pub draw_size: u32,
    pub seed_count: Option<u32>,
    pub qualifier_count: u32,
    pub qual_rounds: u32,
    pub state: TournamentState,
    /// Seed that produced the current bracket.
    pub rng_seed_active: Option<u64>,
    /// Main-draw slots left empty by bye embedding.
    pub bye_slots: BTreeSet<u32>,
    pub md_scoring: ScoringRules,
    pub qual_scoring: ScoringRules,
    pub created_at: String,
}

impl Tournament {
    pub fn scoring(&self, phase: Phase) -> ScoringRules {
        match phase {
            Phase::Qualification => self.qual_scoring,
            Phase::MainDraw => self.md_scoring,
        }
    }

    pub fn has_qualification(&self) -> bool {
        self.qualifier_count > 0 && self.qual_rounds > 0
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    DirectAccept,
    Wildcard,
    Qualifier,
    QualWildcard,
    LuckyLoser,
    Alternate,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::DirectAccept => "DA",
            EntryType::Wildcard => "WC",
            EntryType::Qualifier => "Q",
            EntryType::QualWildcard => "QWC",
            EntryType::LuckyLoser => "LL",
            EntryType::Alternate => "ALT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DA" => Some(EntryType::DirectAccept),
            "WC" => Some(EntryType::Wildcard),
            "Q" => Some(EntryType::Qualifier),
            "QWC" => Some(EntryType::QualWildcard),
            "LL" => Some(EntryType::LuckyLoser),
            "ALT" => Some(EntryType::Alternate),
            _ => None,
        }
    }

    /// Entered straight into the main draw.
    pub fn is_direct(&self) -> bool {
        matches!(self, EntryType::DirectAccept | EntryType::Wildcard)
    }

    /// Plays the qualification brackets.
    pub fn is_qualifying(&self) -> bool {
        matches!(self, EntryType::Qualifier | EntryType::QualWildcard)
    }
}

sql_text_enum!(EntryType);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryStatus {
    Active,
    Withdrawn,
    Replaced,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Active => "ACTIVE",
            EntryStatus::Withdrawn => "WITHDRAWN",
            EntryStatus::Replaced => "REPLACED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(EntryStatus::Active),
            "WITHDRAWN" => Some(EntryStatus::Withdrawn),
            "REPLACED" => Some(EntryStatus::Replaced),
            _ => None,
        }
    }
}

sql_text_enum!(EntryStatus);

/// A competitor's registration in one tournament.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentEntry {
    pub id: EntryId,
    pub tournament_id: TournamentId,
    pub competitor_id: CompetitorId,
    pub entry_type: EntryType,
    pub status: EntryStatus,
    /// Ranking snapshot; `None` is unranked and sorts last.
    pub world_ranking: Option<u32>,
    pub seed_number: Option<u32>,
    /// Bracket slot; `None` is not placed.
    pub position: Option<u32>,
    pub registration_rank: Option<u32>,
}

impl TournamentEntry {
    pub fn is_active(&self) -> bool {
        self.status == EntryStatus::Active
    }

    /// Placed in a main-draw slot (qualification slots are offset).
    pub fn main_draw_position(&self) -> Option<u32> {
        self.position.filter(|&p| split_slot(p).0 == 0)
    }
}

/// Fields supplied when registering an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub tournament_id: TournamentId,
    pub competitor_id: CompetitorId,
    pub entry_type: EntryType,
    pub world_ranking: Option<u32>,
    pub seed_number: Option<u32>,
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Qualification,
    MainDraw,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Qualification => "QUAL",
            Phase::MainDraw => "MD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUAL" => Some(Phase::Qualification),
            "MD" => Some(Phase::MainDraw),
            _ => None,
        }
    }
}

sql_text_enum!(Phase);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchState {
    Pending,
    Done,
}

impl MatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchState::Pending => "PENDING",
            MatchState::Done => "DONE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(MatchState::Pending),
            "DONE" => Some(MatchState::Done),
            _ => None,
        }
    }
}

sql_text_enum!(MatchState);

/// How a decided match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Played,
    Walkover,
    Retirement,
    Disqualification,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Played => "PLAYED",
            Outcome::Walkover => "WO",
            Outcome::Retirement => "RET",
            Outcome::Disqualification => "DQ",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PLAYED" => Some(Outcome::Played),
            "WO" => Some(Outcome::Walkover),
            "RET" => Some(Outcome::Retirement),
            "DQ" => Some(Outcome::Disqualification),
            _ => None,
        }
    }
}

sql_text_enum!(Outcome);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub phase: Phase,
    pub round_name: String,
    /// Slots in this round (32, 16, ..., 2).
    pub round_size: u32,
    pub slot_top: u32,
    pub slot_bottom: u32,
    pub top_entry_id: Option<EntryId>,
    pub bottom_entry_id: Option<EntryId>,
    pub winner_entry_id: Option<EntryId>,
    pub score: Vec<SetScore>,
    pub outcome: Option<Outcome>,
    pub state: MatchState,
    pub needs_review: bool,
}

impl Match {
    pub fn has_result(&self) -> bool {
        self.state == MatchState::Done || self.winner_entry_id.is_some()
    }

    pub fn entry_on(&self, side: Side) -> Option<EntryId> {
        match side {
            Side::Top => self.top_entry_id,
            Side::Bottom => self.bottom_entry_id,
        }
    }

    pub fn set_entry(&mut self, side: Side, entry: Option<EntryId>) {
        match side {
            Side::Top => self.top_entry_id = entry,
            Side::Bottom => self.bottom_entry_id = entry,
        }
    }

    pub fn side_of(&self, entry: EntryId) -> Option<Side> {
        if self.top_entry_id == Some(entry) {
            Some(Side::Top)
        } else if self.bottom_entry_id == Some(entry) {
            Some(Side::Bottom)
        } else {
            None
        }
    }

    /// Side holding `slot`, if this match covers it.
    pub fn side_of_slot(&self, slot: u32) -> Option<Side> {
        if self.slot_top == slot {
            Some(Side::Top)
        } else if self.slot_bottom == slot {
            Some(Side::Bottom)
        } else {
            None
        }
    }

    /// The `(top, bottom)` pairing, used to detect changed matchups. Order
    /// matters: swapping sides counts as a change.
    pub fn pairing(&self) -> (Option<EntryId>, Option<EntryId>) {
        (self.top_entry_id, self.bottom_entry_id)
    }

    /// Bracket group of the match: 0 for the main draw, `k + 1` for
    /// qualification bracket `k`.
    pub fn bracket_group(&self) -> u32 {
        split_slot(self.slot_top).0
    }

    /// Clear the result and return to PENDING.
    pub fn reset_result(&mut self) {
        self.winner_entry_id = None;
        self.score.clear();
        self.outcome = None;
        self.state = MatchState::Pending;
    }
}

/// A match row to create or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMatch {
    pub phase: Phase,
    pub round_name: String,
    pub round_size: u32,
    pub slot_top: u32,
    pub slot_bottom: u32,
    pub top_entry_id: Option<EntryId>,
    pub bottom_entry_id: Option<EntryId>,
}

/// Calendar binding of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub match_id: MatchId,
    pub play_date: chrono::NaiveDate,
    pub session: String,
    pub order_of_play: u32,
    pub court: Option<String>,
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Mutation that produced a snapshot. Serializes as its column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Confirm,
    Qualification,
    Regenerate,
    Recalculate,
    Reopen,
    BrutalReset,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Confirm => "confirm",
            SnapshotKind::Qualification => "qualification",
            SnapshotKind::Regenerate => "regenerate",
            SnapshotKind::Recalculate => "recalculate",
            SnapshotKind::Reopen => "reopen",
            SnapshotKind::BrutalReset => "brutal_reset",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirm" => Some(SnapshotKind::Confirm),
            "qualification" => Some(SnapshotKind::Qualification),
            "regenerate" => Some(SnapshotKind::Regenerate),
            "recalculate" => Some(SnapshotKind::Recalculate),
            "reopen" => Some(SnapshotKind::Reopen),
            "brutal_reset" => Some(SnapshotKind::BrutalReset),
            _ => None,
        }
    }
}

sql_text_enum!(SnapshotKind);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub tournament_id: TournamentId,
    pub kind: SnapshotKind,
    pub created_at: String,
    pub size_bytes: usize,
    pub payload: serde_json::Value,
}
