// Pure bracket algorithms: anchors, shuffling, mapping, byes, qualification
// tiers, roster ordering, capacity classification and score rules. Nothing
// in this crate touches storage.

pub mod anchors;
pub mod embed;
pub mod error;
pub mod mapper;
pub mod planner;
pub mod qualification;
pub mod roster;
pub mod rounds;
pub mod score;
pub mod shuffle;

pub use anchors::{band_sequence_for_seeds, seed_anchor_map, BandAnchors, SeedBand};
pub use embed::{build_embedded_bracket, template_size, EmbeddedBracket};
pub use error::BracketError;
pub use mapper::{build_bracket, SlotMap};
pub use qualification::{build_qualification_brackets, qualification_bracket_size, QualTier};
pub use score::{ScoringRules, SetScore, Side};
pub use shuffle::deterministic_shuffle;
