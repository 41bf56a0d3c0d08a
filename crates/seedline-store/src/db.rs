// SQLite persistence layer for tournaments, entries, matches and snapshots.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::debug;

use crate::config::DatabaseSettings;
use crate::error::StoreError;

/// SQLite-backed store. All structural writes go through [`Database::write`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` with the default
    /// 5 second lock wait. Pass `":memory:"` for an ephemeral database
    /// (useful for tests).
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with(&DatabaseSettings {
            path: path.to_string(),
            busy_timeout_ms: 5000,
        })
    }

    /// Open the database described by `settings`, creating the parent
    /// directory of a file path when needed.
    pub fn open_with(settings: &DatabaseSettings) -> Result<Self> {
        let path = settings.resolved_path()?;
        if path.as_os_str() != ":memory:" {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;
        conn.busy_timeout(Duration::from_millis(settings.busy_timeout_ms))
            .context("failed to set busy timeout")?;

        conn.execute_batch(SCHEMA)
            .context("failed to create database schema")?;

        debug!(path = %path.display(), "database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get a lock on the connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Run `f` inside an `IMMEDIATE` transaction. The write lock is taken
    /// before `f` reads anything; it commits when `f` returns `Ok` and rolls
    /// back otherwise.
    pub fn write<T, E>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    /// Run `f` against a consistent read of the database.
    pub fn read<T, E>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(StoreError::from)?;
        f(&tx)
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS competitors (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    name    TEXT NOT NULL,
    country TEXT
);

CREATE TABLE IF NOT EXISTS seasons (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS categories (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS category_seasons (
    category_id     INTEGER NOT NULL REFERENCES categories(id),
    season_id       INTEGER NOT NULL REFERENCES seasons(id),
    draw_size       INTEGER NOT NULL,
    seed_count      INTEGER,
    qualifier_count INTEGER NOT NULL DEFAULT 0,
    qual_rounds     INTEGER NOT NULL DEFAULT 0,
    md_scoring      TEXT NOT NULL,
    qual_scoring    TEXT NOT NULL,
    PRIMARY KEY (category_id, season_id)
);

CREATE TABLE IF NOT EXISTS tournaments (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    category_id     INTEGER NOT NULL REFERENCES categories(id),
    season_id       INTEGER NOT NULL REFERENCES seasons(id),
    draw_size       INTEGER NOT NULL,
    seed_count      INTEGER,
    qualifier_count INTEGER NOT NULL,
    qual_rounds     INTEGER NOT NULL,
    state           TEXT NOT NULL DEFAULT 'REG',
    rng_seed_active INTEGER,
    bye_slots       TEXT NOT NULL DEFAULT '[]',
    md_scoring      TEXT NOT NULL,
    qual_scoring    TEXT NOT NULL,
    created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS tournament_entries (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    tournament_id     INTEGER NOT NULL REFERENCES tournaments(id),
    competitor_id     INTEGER NOT NULL REFERENCES competitors(id),
    entry_type        TEXT NOT NULL,
    status            TEXT NOT NULL DEFAULT 'ACTIVE',
    world_ranking     INTEGER,
    seed_number       INTEGER,
    position          INTEGER,
    registration_rank INTEGER
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_entries_active_competitor
    ON tournament_entries(tournament_id, competitor_id) WHERE status = 'ACTIVE';
CREATE UNIQUE INDEX IF NOT EXISTS idx_entries_active_position
    ON tournament_entries(tournament_id, position)
    WHERE status = 'ACTIVE' AND position IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_entries_active_seed
    ON tournament_entries(tournament_id, seed_number)
    WHERE status = 'ACTIVE' AND seed_number IS NOT NULL;

CREATE TABLE IF NOT EXISTS matches (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    tournament_id   INTEGER NOT NULL REFERENCES tournaments(id),
    phase           TEXT NOT NULL,
    round_name      TEXT NOT NULL,
    round_size      INTEGER NOT NULL,
    slot_top        INTEGER NOT NULL,
    slot_bottom     INTEGER NOT NULL,
    top_entry_id    INTEGER REFERENCES tournament_entries(id),
    bottom_entry_id INTEGER REFERENCES tournament_entries(id),
    winner_entry_id INTEGER REFERENCES tournament_entries(id),
    score           TEXT NOT NULL DEFAULT '[]',
    outcome         TEXT,
    state           TEXT NOT NULL DEFAULT 'PENDING',
    needs_review    INTEGER NOT NULL DEFAULT 0,
    UNIQUE (tournament_id, phase, round_name, slot_top, slot_bottom)
);

CREATE TABLE IF NOT EXISTS schedules (
    match_id      INTEGER PRIMARY KEY REFERENCES matches(id) ON DELETE CASCADE,
    play_date     TEXT NOT NULL,
    session       TEXT NOT NULL,
    order_of_play INTEGER NOT NULL,
    court         TEXT
);

CREATE TABLE IF NOT EXISTS snapshots (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    tournament_id INTEGER NOT NULL REFERENCES tournaments(id),
    kind          TEXT NOT NULL,
    created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    size_bytes    INTEGER NOT NULL,
    payload       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_matches_tournament ON matches(tournament_id, phase);
CREATE INDEX IF NOT EXISTS idx_snapshots_tournament ON snapshots(tournament_id, id);
";
