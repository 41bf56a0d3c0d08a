// Engine error taxonomy.

use thiserror::Error;

use seedline_core::BracketError;
use seedline_store::{CompetitorId, StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    /// Sizing or rounds missing or inconsistent. Raised before any write.
    #[error("configuration error in `{field}`: {message}")]
    Configuration { field: String, message: String },

    #[error("not enough {what}: need {needed}, have {available}")]
    Capacity {
        what: String,
        needed: usize,
        available: usize,
    },

    /// Occupied slot, decided match, stale preview or wrong lifecycle state.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{} competitor(s) failed the eligibility check: {competitors:?}", competitors.len())]
    Eligibility { competitors: Vec<CompetitorId> },

    /// Lock wait exceeded the store timeout. Nothing changed; safe to retry.
    #[error("timed out waiting for the tournament lock")]
    LockTimeout,

    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: i64 },

    #[error(transparent)]
    Bracket(BracketError),

    #[error("storage failure: {0}")]
    Store(#[source] StoreError),
}

impl EngineError {
    /// Only lock timeouts are worth retrying unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::LockTimeout)
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        EngineError::Conflict(message.into())
    }

    pub(crate) fn configuration(field: &str, message: impl Into<String>) -> Self {
        EngineError::Configuration {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Busy(_) => EngineError::LockTimeout,
            StoreError::NotFound { what, id } => EngineError::NotFound { what, id },
            other => EngineError::Store(other),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::from(err).into()
    }
}

impl From<BracketError> for EngineError {
    fn from(err: BracketError) -> Self {
        match err {
            BracketError::CountMismatch { needed, available } => EngineError::Capacity {
                what: "entries to fill the bracket".into(),
                needed,
                available,
            },
            BracketError::PromotionOverflow {
                group,
                promoted,
                capacity,
            } => EngineError::Capacity {
                what: format!("{group} places for wildcard entries"),
                needed: promoted,
                available: capacity,
            },
            BracketError::UnsupportedSize { .. } | BracketError::TooManySeeds { .. } => {
                EngineError::configuration("draw_size", err.to_string())
            }
            BracketError::BandMisaligned { .. } => {
                EngineError::configuration("seed_count", err.to_string())
            }
            BracketError::QualificationShape(_) => {
                EngineError::configuration("qual_rounds", err.to_string())
            }
            other => EngineError::Bracket(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_lock_timeouts_are_transient() {
        assert!(EngineError::LockTimeout.is_transient());
        assert!(!EngineError::conflict("slot taken").is_transient());
        assert!(!EngineError::Eligibility { competitors: vec![3] }.is_transient());
    }

    #[test]
    fn store_errors_map_onto_the_taxonomy() {
        let err: EngineError = StoreError::NotFound { what: "match", id: 9 }.into();
        assert!(matches!(err, EngineError::NotFound { what: "match", id: 9 }));
    }

    #[test]
    fn bracket_errors_map_onto_the_taxonomy() {
        let err: EngineError = BracketError::CountMismatch {
            needed: 12,
            available: 10,
        }
        .into();
        assert!(matches!(
            err,
            EngineError::Capacity {
                needed: 12,
                available: 10,
                ..
            }
        ));

        let err: EngineError = BracketError::BandMisaligned { seeds: 3, size: 16 }.into();
        assert!(matches!(err, EngineError::Configuration { ref field, .. } if field == "seed_count"));

        let err: EngineError = BracketError::UnknownBand("3-5".into()).into();
        assert!(matches!(err, EngineError::Bracket(BracketError::UnknownBand(_))));
    }

    #[test]
    fn eligibility_message_lists_everyone() {
        let err = EngineError::Eligibility {
            competitors: vec![4, 8, 15],
        };
        assert_eq!(
            err.to_string(),
            "3 competitor(s) failed the eligibility check: [4, 8, 15]"
        );
    }
}
