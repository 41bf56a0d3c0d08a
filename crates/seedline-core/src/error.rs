// Error type shared by the pure bracket algorithms.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BracketError {
    #[error("unsupported bracket size {size}: must be a power of two between 2 and {max}")]
    UnsupportedSize { size: u32, max: u32 },

    #[error("seed count {seeds} does not end on a seed band boundary for a {size}-slot bracket")]
    BandMisaligned { seeds: usize, size: u32 },

    #[error("not enough unseeded entries: need {needed}, have {available}")]
    CountMismatch { needed: usize, available: usize },

    #[error("draw size {draw} cannot hold {seeds} seeds")]
    TooManySeeds { seeds: usize, draw: u32 },

    #[error("unknown seed band `{0}`")]
    UnknownBand(String),

    #[error("unsupported qualification shape: {0}")]
    QualificationShape(String),

    #[error("bracket mapping is not a bijection: {0}")]
    BrokenMapping(String),

    #[error("{promoted} promoted entries exceed the {group} capacity of {capacity}")]
    PromotionOverflow {
        group: &'static str,
        promoted: usize,
        capacity: usize,
    },

    #[error("invalid score: {0}")]
    InvalidScore(String),
}
