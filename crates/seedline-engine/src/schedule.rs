// Calendar bindings of matches.

use chrono::NaiveDate;
use tracing::debug;

use seedline_store::rows;
use seedline_store::{MatchId, Schedule, TournamentId};

use crate::eligibility::EligibilityGate;
use crate::error::EngineError;
use crate::Engine;

impl<G: EligibilityGate> Engine<G> {
    /// Bind a match to a day, session and order of play, replacing any
    /// earlier binding. Pairing changes drop the binding again.
    pub fn schedule_match(
        &self,
        match_id: MatchId,
        play_date: NaiveDate,
        session: &str,
        order_of_play: u32,
        court: Option<&str>,
    ) -> Result<Schedule, EngineError> {
        let session = session.trim();
        if session.is_empty() {
            return Err(EngineError::configuration("session", "must not be empty"));
        }
        if order_of_play == 0 {
            return Err(EngineError::configuration("order_of_play", "starts at 1"));
        }
        self.db.write(|tx| {
            let m = rows::load_match(tx, match_id)?;
            if m.has_result() {
                return Err(EngineError::conflict(format!(
                    "match {match_id} is already decided"
                )));
            }
            let schedule = Schedule {
                match_id,
                play_date,
                session: session.to_string(),
                order_of_play,
                court: court.map(str::to_string),
            };
            rows::upsert_schedule(tx, &schedule)?;
            debug!(match_id, %play_date, session, order_of_play, "match scheduled");
            Ok(schedule)
        })
    }

    /// Remove a match's binding. Returns whether one existed.
    pub fn unschedule_match(&self, match_id: MatchId) -> Result<bool, EngineError> {
        self.db.write(|tx| {
            rows::load_match(tx, match_id)?;
            Ok(rows::delete_schedule(tx, match_id)?)
        })
    }

    pub fn schedules(&self, tournament_id: TournamentId) -> Result<Vec<Schedule>, EngineError> {
        self.db.read(|conn| {
            rows::load_tournament(conn, tournament_id)?;
            Ok(rows::load_schedules(conn, tournament_id)?)
        })
    }

    /// The binding of one match, if any.
    pub fn schedule_of(&self, match_id: MatchId) -> Result<Option<Schedule>, EngineError> {
        self.db.read(|conn| Ok(rows::load_schedule(conn, match_id)?))
    }
}
