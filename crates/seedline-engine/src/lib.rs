// Bracket construction and outcome propagation engine.
//
// Every mutating operation runs inside one `Database::write` transaction:
// it either commits completely or leaves the tournament untouched.

mod bracket;
pub mod draw;
pub mod eligibility;
pub mod error;
pub mod planner;
pub mod qualification;
pub mod regenerate;
pub mod results;
pub mod roster;
pub mod schedule;
pub mod snapshot;

use std::path::Path;

use anyhow::Context;
use tracing::info;

use seedline_store::config::load_config_at;
use seedline_store::{Config, Database};

pub use draw::DrawOutcome;
pub use eligibility::{AllowAll, DenyList, EligibilityGate};
pub use error::EngineError;
pub use planner::{PlannedEntry, RecalcPreview};
pub use qualification::QualificationOutcome;
pub use regenerate::RegenerateScope;
pub use results::{ResultMode, SpecialOutcome};
pub use roster::{FillOutcome, ReinstateOutcome};

/// Entry point for all bracket operations on one store.
pub struct Engine<G = AllowAll> {
    db: Database,
    config: Config,
    gate: G,
}

impl<G: EligibilityGate> Engine<G> {
    pub fn new(db: Database, config: Config, gate: G) -> Self {
        Engine { db, config, gate }
    }

    /// Load `config/engine.toml` under `base_dir` (installing it from
    /// `defaults/` when missing) and open the database it names.
    pub fn open(base_dir: &Path, gate: G) -> anyhow::Result<Self> {
        let config = load_config_at(base_dir).context("failed to load configuration")?;
        let db = Database::open_with(&config.database).context("failed to open database")?;
        info!(
            path = %config.database.path,
            busy_timeout_ms = config.database.busy_timeout_ms,
            "engine opened"
        );
        Ok(Engine::new(db, config, gate))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
