// Audit snapshots of a tournament's visible bracket state, with retention.

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, warn};

use seedline_store::config::SnapshotRetention;
use seedline_store::rows;
use seedline_store::{
    Match, Schedule, Snapshot, SnapshotId, SnapshotKind, Tournament, TournamentEntry,
    TournamentId,
};

use crate::eligibility::EligibilityGate;
use crate::error::EngineError;
use crate::Engine;

#[derive(Serialize)]
struct SnapshotPayload<'a> {
    kind: SnapshotKind,
    captured_at: String,
    tournament: &'a Tournament,
    entries: &'a [TournamentEntry],
    matches: &'a [Match],
    schedules: &'a [Schedule],
    rng_seed: Option<u64>,
}

/// Record the current state of `tournament_id` and apply retention.
pub(crate) fn capture(
    conn: &Connection,
    tournament_id: TournamentId,
    kind: SnapshotKind,
    retention: SnapshotRetention,
) -> Result<SnapshotId, EngineError> {
    let tournament = rows::load_tournament(conn, tournament_id)?;
    let entries = rows::load_entries(conn, tournament_id)?;
    let matches = rows::load_matches(conn, tournament_id, None)?;
    let schedules = rows::load_schedules(conn, tournament_id)?;

    let payload = serde_json::to_value(SnapshotPayload {
        kind,
        captured_at: chrono::Utc::now().to_rfc3339(),
        tournament: &tournament,
        entries: &entries,
        matches: &matches,
        schedules: &schedules,
        rng_seed: tournament.rng_seed_active,
    })
    .map_err(seedline_store::StoreError::from)?;

    let id = rows::insert_snapshot(conn, tournament_id, kind, &payload)?;
    debug!(tournament_id, snapshot_id = id, kind = kind.as_str(), "snapshot captured");
    enforce_retention(conn, tournament_id, retention)?;
    Ok(id)
}

/// Evict the oldest snapshots until both caps hold. The newest snapshot is
/// always kept.
fn enforce_retention(
    conn: &Connection,
    tournament_id: TournamentId,
    retention: SnapshotRetention,
) -> Result<(), EngineError> {
    let sizes = rows::snapshot_sizes(conn, tournament_id)?;
    let mut count = sizes.len();
    let mut total: usize = sizes.iter().map(|(_, size)| size).sum();

    for (id, size) in sizes {
        if count <= 1 || (count <= retention.max_count && total <= retention.max_total_bytes) {
            break;
        }
        rows::delete_snapshot(conn, id)?;
        warn!(tournament_id, snapshot_id = id, size, "snapshot evicted by retention");
        count -= 1;
        total -= size;
    }
    Ok(())
}

impl<G: EligibilityGate> Engine<G> {
    /// Stored snapshots of a tournament, oldest first.
    pub fn snapshots(&self, tournament_id: TournamentId) -> Result<Vec<Snapshot>, EngineError> {
        self.db.read(|tx| {
            rows::load_tournament(tx, tournament_id)?;
            Ok(rows::list_snapshots(tx, tournament_id)?)
        })
    }
}
