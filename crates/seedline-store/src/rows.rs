// Row-level create/load/update functions. Every function takes a plain
// `&Connection`, so it can run inside `Database::write` (where loads are
// made under the write lock) or `Database::read`.

use std::collections::BTreeSet;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::model::{
    CategoryId, CategorySeason, CompetitorId, EntryId, Match, MatchId, NewEntry, NewMatch, Phase,
    Schedule, SeasonId, Snapshot, SnapshotId, SnapshotKind, Tournament, TournamentEntry,
    TournamentId, TournamentState,
};

type Result<T> = std::result::Result<T, StoreError>;

const DATE_FORMAT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Column helpers
// ---------------------------------------------------------------------------

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn not_found(what: &'static str, id: i64) -> StoreError {
    StoreError::NotFound { what, id }
}

// ---------------------------------------------------------------------------
// Competitors, seasons, categories
// ---------------------------------------------------------------------------

pub fn insert_competitor(conn: &Connection, name: &str, country: Option<&str>) -> Result<CompetitorId> {
    conn.execute(
        "INSERT INTO competitors (name, country) VALUES (?1, ?2)",
        params![name, country],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_season(conn: &Connection, name: &str) -> Result<SeasonId> {
    conn.execute("INSERT INTO seasons (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_category(conn: &Connection, name: &str) -> Result<CategoryId> {
    conn.execute("INSERT INTO categories (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

/// Insert or replace the sizing template of a (category, season).
pub fn upsert_category_season(conn: &Connection, template: &CategorySeason) -> Result<()> {
    conn.execute(
        "INSERT INTO category_seasons
            (category_id, season_id, draw_size, seed_count, qualifier_count, qual_rounds,
             md_scoring, qual_scoring)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(category_id, season_id) DO UPDATE SET
            draw_size = excluded.draw_size,
            seed_count = excluded.seed_count,
            qualifier_count = excluded.qualifier_count,
            qual_rounds = excluded.qual_rounds,
            md_scoring = excluded.md_scoring,
            qual_scoring = excluded.qual_scoring",
        params![
            template.category_id,
            template.season_id,
            template.draw_size,
            template.seed_count,
            template.qualifier_count,
            template.qual_rounds,
            to_json(&template.md_scoring)?,
            to_json(&template.qual_scoring)?,
        ],
    )?;
    Ok(())
}

pub fn load_category_season(
    conn: &Connection,
    category_id: CategoryId,
    season_id: SeasonId,
) -> Result<CategorySeason> {
    conn.query_row(
        "SELECT category_id, season_id, draw_size, seed_count, qualifier_count, qual_rounds,
                md_scoring, qual_scoring
         FROM category_seasons WHERE category_id = ?1 AND season_id = ?2",
        params![category_id, season_id],
        |row| {
            Ok(CategorySeason {
                category_id: row.get(0)?,
                season_id: row.get(1)?,
                draw_size: row.get(2)?,
                seed_count: row.get(3)?,
                qualifier_count: row.get(4)?,
                qual_rounds: row.get(5)?,
                md_scoring: json_column(row, 6)?,
                qual_scoring: json_column(row, 7)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| not_found("category season for category", category_id))
}

// ---------------------------------------------------------------------------
// Tournaments
// ---------------------------------------------------------------------------

const TOURNAMENT_COLUMNS: &str = "id, name, category_id, season_id, draw_size, seed_count, \
     qualifier_count, qual_rounds, state, rng_seed_active, bye_slots, md_scoring, qual_scoring, \
     created_at";

fn tournament_from_row(row: &Row<'_>) -> rusqlite::Result<Tournament> {
    let bye_slots: BTreeSet<u32> = json_column(row, 10)?;
    Ok(Tournament {
        id: row.get(0)?,
        name: row.get(1)?,
        category_id: row.get(2)?,
        season_id: row.get(3)?,
        draw_size: row.get(4)?,
        seed_count: row.get(5)?,
        qualifier_count: row.get(6)?,
        qual_rounds: row.get(7)?,
        state: row.get(8)?,
        rng_seed_active: row.get::<_, Option<i64>>(9)?.map(|v| v as u64),
        bye_slots,
        md_scoring: json_column(row, 11)?,
        qual_scoring: json_column(row, 12)?,
        created_at: row.get(13)?,
    })
}

/// Create a tournament by copying the current (category, season) template.
/// Later template edits do not reach the copy.
pub fn create_tournament(
    conn: &Connection,
    name: &str,
    category_id: CategoryId,
    season_id: SeasonId,
) -> Result<Tournament> {
    let template = load_category_season(conn, category_id, season_id)?;
    conn.execute(
        "INSERT INTO tournaments
            (name, category_id, season_id, draw_size, seed_count, qualifier_count, qual_rounds,
             state, md_scoring, qual_scoring)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            name,
            category_id,
            season_id,
            template.draw_size,
            template.seed_count,
            template.qualifier_count,
            template.qual_rounds,
            TournamentState::Registration,
            to_json(&template.md_scoring)?,
            to_json(&template.qual_scoring)?,
        ],
    )?;
    load_tournament(conn, conn.last_insert_rowid())
}

pub fn load_tournament(conn: &Connection, id: TournamentId) -> Result<Tournament> {
    conn.query_row(
        &format!("SELECT {TOURNAMENT_COLUMNS} FROM tournaments WHERE id = ?1"),
        params![id],
        tournament_from_row,
    )
    .optional()?
    .ok_or_else(|| not_found("tournament", id))
}

/// Persist the mutable draw state of a tournament: lifecycle state, active
/// RNG seed and bye slots.
pub fn update_tournament_progress(conn: &Connection, tournament: &Tournament) -> Result<()> {
    let changed = conn.execute(
        "UPDATE tournaments SET state = ?2, rng_seed_active = ?3, bye_slots = ?4 WHERE id = ?1",
        params![
            tournament.id,
            tournament.state,
            tournament.rng_seed_active.map(|s| s as i64),
            to_json(&tournament.bye_slots)?,
        ],
    )?;
    if changed == 0 {
        return Err(not_found("tournament", tournament.id));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

const ENTRY_COLUMNS: &str = "id, tournament_id, competitor_id, entry_type, status, world_ranking, \
     seed_number, position, registration_rank";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<TournamentEntry> {
    Ok(TournamentEntry {
        id: row.get(0)?,
        tournament_id: row.get(1)?,
        competitor_id: row.get(2)?,
        entry_type: row.get(3)?,
        status: row.get(4)?,
        world_ranking: row.get(5)?,
        seed_number: row.get(6)?,
        position: row.get(7)?,
        registration_rank: row.get(8)?,
    })
}

pub fn insert_entry(conn: &Connection, entry: &NewEntry) -> Result<EntryId> {
    conn.execute(
        "INSERT INTO tournament_entries
            (tournament_id, competitor_id, entry_type, world_ranking, seed_number)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.tournament_id,
            entry.competitor_id,
            entry.entry_type,
            entry.world_ranking,
            entry.seed_number,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn load_entry(conn: &Connection, id: EntryId) -> Result<TournamentEntry> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM tournament_entries WHERE id = ?1"),
        params![id],
        entry_from_row,
    )
    .optional()?
    .ok_or_else(|| not_found("entry", id))
}

/// Every entry of a tournament, any status, by id.
pub fn load_entries(conn: &Connection, tournament_id: TournamentId) -> Result<Vec<TournamentEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM tournament_entries WHERE tournament_id = ?1 ORDER BY id"
    ))?;
    let entries = stmt
        .query_map(params![tournament_id], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

/// Write back a batch of entries.
///
/// Positions and seed numbers are cleared on the whole batch first, so
/// entries may trade slots or seeds without tripping the unique indexes
/// half-way through.
pub fn update_entries(conn: &Connection, entries: &[TournamentEntry]) -> Result<()> {
    let mut clear = conn.prepare(
        "UPDATE tournament_entries SET position = NULL, seed_number = NULL WHERE id = ?1",
    )?;
    for entry in entries {
        if clear.execute(params![entry.id])? == 0 {
            return Err(not_found("entry", entry.id));
        }
    }

    let mut write = conn.prepare(
        "UPDATE tournament_entries
         SET entry_type = ?2, status = ?3, world_ranking = ?4, seed_number = ?5,
             position = ?6, registration_rank = ?7
         WHERE id = ?1",
    )?;
    for entry in entries {
        write.execute(params![
            entry.id,
            entry.entry_type,
            entry.status,
            entry.world_ranking,
            entry.seed_number,
            entry.position,
            entry.registration_rank,
        ])?;
    }
    Ok(())
}

pub fn update_entry(conn: &Connection, entry: &TournamentEntry) -> Result<()> {
    update_entries(conn, std::slice::from_ref(entry))
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

const MATCH_COLUMNS: &str = "id, tournament_id, phase, round_name, round_size, slot_top, \
     slot_bottom, top_entry_id, bottom_entry_id, winner_entry_id, score, outcome, state, \
     needs_review";

fn match_from_row(row: &Row<'_>) -> rusqlite::Result<Match> {
    Ok(Match {
        id: row.get(0)?,
        tournament_id: row.get(1)?,
        phase: row.get(2)?,
        round_name: row.get(3)?,
        round_size: row.get(4)?,
        slot_top: row.get(5)?,
        slot_bottom: row.get(6)?,
        top_entry_id: row.get(7)?,
        bottom_entry_id: row.get(8)?,
        winner_entry_id: row.get(9)?,
        score: json_column(row, 10)?,
        outcome: row.get(11)?,
        state: row.get(12)?,
        needs_review: row.get(13)?,
    })
}

/// Create a match, or refresh the competitors of the existing match with
/// the same (phase, round, slots) key. Returns the match id, which is
/// stable across refreshes.
pub fn upsert_match(conn: &Connection, tournament_id: TournamentId, m: &NewMatch) -> Result<MatchId> {
    let id = conn.query_row(
        "INSERT INTO matches
            (tournament_id, phase, round_name, round_size, slot_top, slot_bottom,
             top_entry_id, bottom_entry_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(tournament_id, phase, round_name, slot_top, slot_bottom) DO UPDATE SET
            round_size = excluded.round_size,
            top_entry_id = excluded.top_entry_id,
            bottom_entry_id = excluded.bottom_entry_id
         RETURNING id",
        params![
            tournament_id,
            m.phase,
            m.round_name,
            m.round_size,
            m.slot_top,
            m.slot_bottom,
            m.top_entry_id,
            m.bottom_entry_id,
        ],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn load_match(conn: &Connection, id: MatchId) -> Result<Match> {
    conn.query_row(
        &format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = ?1"),
        params![id],
        match_from_row,
    )
    .optional()?
    .ok_or_else(|| not_found("match", id))
}

/// Matches of a tournament, optionally restricted to one phase, earliest
/// round first and by slot within a round.
pub fn load_matches(
    conn: &Connection,
    tournament_id: TournamentId,
    phase: Option<Phase>,
) -> Result<Vec<Match>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MATCH_COLUMNS} FROM matches
         WHERE tournament_id = ?1 AND (?2 IS NULL OR phase = ?2)
         ORDER BY phase, round_size DESC, slot_top"
    ))?;
    let matches = stmt
        .query_map(params![tournament_id, phase], match_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(matches)
}

/// Write back competitors, result and review flag of a match.
pub fn update_match(conn: &Connection, m: &Match) -> Result<()> {
    let changed = conn.execute(
        "UPDATE matches
         SET top_entry_id = ?2, bottom_entry_id = ?3, winner_entry_id = ?4, score = ?5,
             outcome = ?6, state = ?7, needs_review = ?8
         WHERE id = ?1",
        params![
            m.id,
            m.top_entry_id,
            m.bottom_entry_id,
            m.winner_entry_id,
            to_json(&m.score)?,
            m.outcome,
            m.state,
            m.needs_review,
        ],
    )?;
    if changed == 0 {
        return Err(not_found("match", m.id));
    }
    Ok(())
}

/// Delete matches by id; their schedules cascade.
pub fn delete_matches_by_id(conn: &Connection, ids: &[MatchId]) -> Result<usize> {
    let mut stmt = conn.prepare("DELETE FROM matches WHERE id = ?1")?;
    let mut deleted = 0;
    for id in ids {
        deleted += stmt.execute(params![id])?;
    }
    Ok(deleted)
}

/// Delete every match of a tournament, or of one phase.
pub fn delete_matches(
    conn: &Connection,
    tournament_id: TournamentId,
    phase: Option<Phase>,
) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM matches WHERE tournament_id = ?1 AND (?2 IS NULL OR phase = ?2)",
        params![tournament_id, phase],
    )?)
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    let date: String = row.get(1)?;
    let play_date = chrono::NaiveDate::parse_from_str(&date, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    Ok(Schedule {
        match_id: row.get(0)?,
        play_date,
        session: row.get(2)?,
        order_of_play: row.get(3)?,
        court: row.get(4)?,
    })
}

pub fn upsert_schedule(conn: &Connection, schedule: &Schedule) -> Result<()> {
    conn.execute(
        "INSERT INTO schedules (match_id, play_date, session, order_of_play, court)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(match_id) DO UPDATE SET
            play_date = excluded.play_date,
            session = excluded.session,
            order_of_play = excluded.order_of_play,
            court = excluded.court",
        params![
            schedule.match_id,
            schedule.play_date.format(DATE_FORMAT).to_string(),
            schedule.session,
            schedule.order_of_play,
            schedule.court,
        ],
    )?;
    Ok(())
}

pub fn load_schedule(conn: &Connection, match_id: MatchId) -> Result<Option<Schedule>> {
    Ok(conn
        .query_row(
            "SELECT match_id, play_date, session, order_of_play, court
             FROM schedules WHERE match_id = ?1",
            params![match_id],
            schedule_from_row,
        )
        .optional()?)
}

pub fn load_schedules(conn: &Connection, tournament_id: TournamentId) -> Result<Vec<Schedule>> {
    let mut stmt = conn.prepare(
        "SELECT s.match_id, s.play_date, s.session, s.order_of_play, s.court
         FROM schedules s JOIN matches m ON m.id = s.match_id
         WHERE m.tournament_id = ?1
         ORDER BY s.play_date, s.session, s.order_of_play",
    )?;
    let schedules = stmt
        .query_map(params![tournament_id], schedule_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(schedules)
}

/// Remove a match's schedule. Returns whether one existed.
pub fn delete_schedule(conn: &Connection, match_id: MatchId) -> Result<bool> {
    Ok(conn.execute("DELETE FROM schedules WHERE match_id = ?1", params![match_id])? > 0)
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        id: row.get(0)?,
        tournament_id: row.get(1)?,
        kind: row.get(2)?,
        created_at: row.get(3)?,
        size_bytes: row.get::<_, i64>(4)? as usize,
        payload: json_column(row, 5)?,
    })
}

pub fn insert_snapshot(
    conn: &Connection,
    tournament_id: TournamentId,
    kind: SnapshotKind,
    payload: &serde_json::Value,
) -> Result<SnapshotId> {
    let text = to_json(payload)?;
    conn.execute(
        "INSERT INTO snapshots (tournament_id, kind, size_bytes, payload) VALUES (?1, ?2, ?3, ?4)",
        params![tournament_id, kind, text.len() as i64, text],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Snapshots of a tournament, oldest first.
pub fn list_snapshots(conn: &Connection, tournament_id: TournamentId) -> Result<Vec<Snapshot>> {
    let mut stmt = conn.prepare(
        "SELECT id, tournament_id, kind, created_at, size_bytes, payload
         FROM snapshots WHERE tournament_id = ?1 ORDER BY id",
    )?;
    let snapshots = stmt
        .query_map(params![tournament_id], snapshot_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(snapshots)
}

/// `(id, size_bytes)` of a tournament's snapshots, oldest first.
pub fn snapshot_sizes(conn: &Connection, tournament_id: TournamentId) -> Result<Vec<(SnapshotId, usize)>> {
    let mut stmt = conn.prepare(
        "SELECT id, size_bytes FROM snapshots WHERE tournament_id = ?1 ORDER BY id",
    )?;
    let sizes = stmt
        .query_map(params![tournament_id], |row| {
            Ok((row.get(0)?, row.get::<_, i64>(1)? as usize))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(sizes)
}

pub fn delete_snapshot(conn: &Connection, id: SnapshotId) -> Result<()> {
    conn.execute("DELETE FROM snapshots WHERE id = ?1", params![id])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::model::{EntryStatus, EntryType, MatchState, Outcome};
    use seedline_core::{ScoringRules, SetScore};

    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    /// Helper: a season, a category and a 16-draw template.
    fn seed_template(conn: &Connection) -> (CategoryId, SeasonId) {
        let season = insert_season(conn, "2026").unwrap();
        let category = insert_category(conn, "Open").unwrap();
        upsert_category_season(
            conn,
            &CategorySeason {
                category_id: category,
                season_id: season,
                draw_size: 16,
                seed_count: Some(4),
                qualifier_count: 2,
                qual_rounds: 2,
                md_scoring: ScoringRules::default(),
                qual_scoring: ScoringRules {
                    best_of: 1,
                    points_to_win: 8,
                    win_by_two: true,
                    set_cap: Some(9),
                },
            },
        )
        .unwrap();
        (category, season)
    }

    fn entry(conn: &Connection, tournament_id: TournamentId, ranking: u32) -> EntryId {
        let competitor = insert_competitor(conn, &format!("Player {ranking}"), Some("NZ")).unwrap();
        insert_entry(
            conn,
            &NewEntry {
                tournament_id,
                competitor_id: competitor,
                entry_type: EntryType::DirectAccept,
                world_ranking: Some(ranking),
                seed_number: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn create_tournament_copies_template() {
        let db = test_db();
        db.write(|tx| {
            let (category, season) = seed_template(tx);
            let t = create_tournament(tx, "City Open", category, season)?;
            assert_eq!(t.draw_size, 16);
            assert_eq!(t.seed_count, Some(4));
            assert_eq!(t.state, TournamentState::Registration);
            assert_eq!(t.qual_scoring.points_to_win, 8);
            assert!(t.bye_slots.is_empty());

            // Editing the template afterwards leaves the tournament alone.
            let mut template = load_category_season(tx, category, season)?;
            template.draw_size = 32;
            upsert_category_season(tx, &template)?;
            assert_eq!(load_tournament(tx, t.id)?.draw_size, 16);
            Ok::<_, StoreError>(())
        })
        .unwrap();
    }

    #[test]
    fn missing_template_is_not_found() {
        let db = test_db();
        let err = db
            .write(|tx| create_tournament(tx, "Nowhere", 1, 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn tournament_progress_round_trip() {
        let db = test_db();
        db.write(|tx| {
            let (category, season) = seed_template(tx);
            let mut t = create_tournament(tx, "City Open", category, season)?;
            t.state = TournamentState::MainDraw;
            t.rng_seed_active = Some(12345);
            t.bye_slots = [2, 15].into_iter().collect();
            update_tournament_progress(tx, &t)?;
            assert_eq!(load_tournament(tx, t.id)?, t);
            Ok::<_, StoreError>(())
        })
        .unwrap();
    }

    #[test]
    fn entries_can_trade_positions_in_one_batch() {
        let db = test_db();
        db.write(|tx| {
            let (category, season) = seed_template(tx);
            let t = create_tournament(tx, "City Open", category, season)?;
            let a = entry(tx, t.id, 1);
            let b = entry(tx, t.id, 2);

            let mut ea = load_entry(tx, a)?;
            let mut eb = load_entry(tx, b)?;
            ea.position = Some(1);
            eb.position = Some(16);
            update_entries(tx, &[ea.clone(), eb.clone()])?;

            ea.position = Some(16);
            eb.position = Some(1);
            update_entries(tx, &[ea, eb])?;

            let loaded = load_entries(tx, t.id)?;
            assert_eq!(loaded[0].position, Some(16));
            assert_eq!(loaded[1].position, Some(1));
            Ok::<_, StoreError>(())
        })
        .unwrap();
    }

    #[test]
    fn duplicate_active_position_is_rejected() {
        let db = test_db();
        let result = db.write(|tx| {
            let (category, season) = seed_template(tx);
            let t = create_tournament(tx, "City Open", category, season)?;
            let a = entry(tx, t.id, 1);
            let b = entry(tx, t.id, 2);
            let mut ea = load_entry(tx, a)?;
            let mut eb = load_entry(tx, b)?;
            ea.position = Some(5);
            eb.position = Some(5);
            update_entries(tx, &[ea, eb])
        });
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }

    #[test]
    fn withdrawn_entries_release_their_position() {
        let db = test_db();
        db.write(|tx| {
            let (category, season) = seed_template(tx);
            let t = create_tournament(tx, "City Open", category, season)?;
            let a = entry(tx, t.id, 1);
            let b = entry(tx, t.id, 2);
            let mut ea = load_entry(tx, a)?;
            ea.status = EntryStatus::Withdrawn;
            ea.position = Some(3);
            update_entry(tx, &ea)?;
            let mut eb = load_entry(tx, b)?;
            eb.position = Some(3);
            update_entry(tx, &eb)?;
            Ok::<_, StoreError>(())
        })
        .unwrap();
    }

    #[test]
    fn upsert_match_keeps_id_for_same_key() {
        let db = test_db();
        db.write(|tx| {
            let (category, season) = seed_template(tx);
            let t = create_tournament(tx, "City Open", category, season)?;
            let a = entry(tx, t.id, 1);
            let b = entry(tx, t.id, 2);
            let c = entry(tx, t.id, 3);

            let mut new = NewMatch {
                phase: Phase::MainDraw,
                round_name: "R16".into(),
                round_size: 16,
                slot_top: 1,
                slot_bottom: 2,
                top_entry_id: Some(a),
                bottom_entry_id: Some(b),
            };
            let id = upsert_match(tx, t.id, &new)?;
            new.bottom_entry_id = Some(c);
            assert_eq!(upsert_match(tx, t.id, &new)?, id);

            let m = load_match(tx, id)?;
            assert_eq!(m.bottom_entry_id, Some(c));
            assert_eq!(m.state, MatchState::Pending);
            assert!(!m.needs_review);
            Ok::<_, StoreError>(())
        })
        .unwrap();
    }

    #[test]
    fn match_result_round_trip_and_schedule_cascade() {
        let db = test_db();
        db.write(|tx| {
            let (category, season) = seed_template(tx);
            let t = create_tournament(tx, "City Open", category, season)?;
            let a = entry(tx, t.id, 1);
            let b = entry(tx, t.id, 2);
            let id = upsert_match(
                tx,
                t.id,
                &NewMatch {
                    phase: Phase::MainDraw,
                    round_name: "R16".into(),
                    round_size: 16,
                    slot_top: 1,
                    slot_bottom: 2,
                    top_entry_id: Some(a),
                    bottom_entry_id: Some(b),
                },
            )?;

            let mut m = load_match(tx, id)?;
            m.winner_entry_id = Some(a);
            m.score = vec![SetScore::new(6, 3), SetScore::new(6, 4)];
            m.outcome = Some(Outcome::Played);
            m.state = MatchState::Done;
            m.needs_review = true;
            update_match(tx, &m)?;
            assert_eq!(load_match(tx, id)?, m);

            let schedule = Schedule {
                match_id: id,
                play_date: chrono::NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
                session: "Day".into(),
                order_of_play: 1,
                court: Some("Centre".into()),
            };
            upsert_schedule(tx, &schedule)?;
            assert_eq!(load_schedule(tx, id)?, Some(schedule));
            assert_eq!(load_schedules(tx, t.id)?.len(), 1);

            assert_eq!(delete_matches(tx, t.id, Some(Phase::MainDraw))?, 1);
            assert_eq!(load_schedule(tx, id)?, None);
            Ok::<_, StoreError>(())
        })
        .unwrap();
    }

    #[test]
    fn load_matches_filters_by_phase() {
        let db = test_db();
        db.write(|tx| {
            let (category, season) = seed_template(tx);
            let t = create_tournament(tx, "City Open", category, season)?;
            for (phase, round, slot) in [
                (Phase::MainDraw, "QF", 1),
                (Phase::MainDraw, "R16", 1),
                (Phase::Qualification, "Q1", 1001),
            ] {
                upsert_match(
                    tx,
                    t.id,
                    &NewMatch {
                        phase,
                        round_name: round.into(),
                        round_size: if round == "QF" { 8 } else { 16 },
                        slot_top: slot,
                        slot_bottom: slot + 1,
                        top_entry_id: None,
                        bottom_entry_id: None,
                    },
                )?;
            }
            let md = load_matches(tx, t.id, Some(Phase::MainDraw))?;
            assert_eq!(md.len(), 2);
            assert_eq!(md[0].round_name, "R16");
            assert_eq!(load_matches(tx, t.id, None)?.len(), 3);
            Ok::<_, StoreError>(())
        })
        .unwrap();
    }

    #[test]
    fn snapshots_round_trip() {
        let db = test_db();
        db.write(|tx| {
            let (category, season) = seed_template(tx);
            let t = create_tournament(tx, "City Open", category, season)?;
            let payload = serde_json::json!({"kind": "confirm", "rng_seed": 7});
            let id = insert_snapshot(tx, t.id, SnapshotKind::Confirm, &payload)?;

            let listed = list_snapshots(tx, t.id)?;
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].payload, payload);
            assert_eq!(listed[0].size_bytes, payload.to_string().len());
            assert_eq!(snapshot_sizes(tx, t.id)?, vec![(id, listed[0].size_bytes)]);

            delete_snapshot(tx, id)?;
            assert!(list_snapshots(tx, t.id)?.is_empty());
            Ok::<_, StoreError>(())
        })
        .unwrap();
    }
}
