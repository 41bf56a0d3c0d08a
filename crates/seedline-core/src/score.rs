// Set-based score validation.

use serde::{Deserialize, Serialize};

use crate::error::BracketError;

/// Which side of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Top,
    Bottom,
}

/// Points won by each side in one set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetScore {
    pub top: u16,
    pub bottom: u16,
}

impl SetScore {
    pub fn new(top: u16, bottom: u16) -> Self {
        SetScore { top, bottom }
    }
}

/// How sets and matches are won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRules {
    /// Maximum number of sets; must be odd.
    pub best_of: u8,
    /// Points (games) needed to take a set.
    pub points_to_win: u16,
    /// A set must be won by two clear points.
    pub win_by_two: bool,
    /// Score at which a win-by-two set is decided by one point (tennis 7-6).
    #[serde(default)]
    pub set_cap: Option<u16>,
}

impl Default for ScoringRules {
    fn default() -> Self {
        ScoringRules {
            best_of: 3,
            points_to_win: 6,
            win_by_two: true,
            set_cap: Some(7),
        }
    }
}

impl ScoringRules {
    pub fn sets_to_win(&self) -> usize {
        usize::from(self.best_of) / 2 + 1
    }

    /// Reject rule sets that cannot describe a match.
    pub fn validate(&self) -> Result<(), BracketError> {
        if self.best_of == 0 || self.best_of % 2 == 0 {
            return Err(BracketError::InvalidScore(format!(
                "best_of must be odd, got {}",
                self.best_of
            )));
        }
        if self.points_to_win == 0 {
            return Err(BracketError::InvalidScore(
                "points_to_win must be greater than 0".into(),
            ));
        }
        if let Some(cap) = self.set_cap {
            if cap <= self.points_to_win {
                return Err(BracketError::InvalidScore(format!(
                    "set_cap {cap} must exceed points_to_win {}",
                    self.points_to_win
                )));
            }
        }
        Ok(())
    }

    /// Winner of a completed set.
    pub fn set_winner(&self, set: SetScore) -> Result<Side, BracketError> {
        let (side, won, lost) = match set.top.cmp(&set.bottom) {
            std::cmp::Ordering::Greater => (Side::Top, set.top, set.bottom),
            std::cmp::Ordering::Less => (Side::Bottom, set.bottom, set.top),
            std::cmp::Ordering::Equal => {
                return Err(BracketError::InvalidScore(format!(
                    "set {}-{} is tied",
                    set.top, set.bottom
                )))
            }
        };

        let target = self.points_to_win;
        let valid = if !self.win_by_two {
            won == target
        } else if let Some(cap) = self.set_cap.filter(|&cap| won == cap) {
            lost + 2 >= cap
        } else if won == target {
            won - lost >= 2
        } else {
            won > target && won - lost == 2 && self.set_cap.map_or(true, |cap| won < cap)
        };

        if valid {
            Ok(side)
        } else {
            Err(BracketError::InvalidScore(format!(
                "set {}-{} is not a finished set to {target}{}",
                set.top,
                set.bottom,
                if self.win_by_two { " (win by two)" } else { "" }
            )))
        }
    }

    /// Winner of a complete match. Every set must be finished and no set
    /// may follow the one that decided the match.
    pub fn match_winner(&self, sets: &[SetScore]) -> Result<Side, BracketError> {
        let needed = self.sets_to_win();
        let (mut top, mut bottom) = (0usize, 0usize);

        for (i, &set) in sets.iter().enumerate() {
            if top == needed || bottom == needed {
                return Err(BracketError::InvalidScore(format!(
                    "set {} played after the match was decided",
                    i + 1
                )));
            }
            match self.set_winner(set)? {
                Side::Top => top += 1,
                Side::Bottom => bottom += 1,
            }
        }

        if top == needed {
            Ok(Side::Top)
        } else if bottom == needed {
            Ok(Side::Bottom)
        } else {
            Err(BracketError::InvalidScore(format!(
                "match undecided after {} sets ({top}-{bottom})",
                sets.len()
            )))
        }
    }

    /// Validate the sets of a match that ended early (retirement or
    /// disqualification). Finished sets must be well formed and must not
    /// already decide the match; the last set may be unfinished.
    pub fn validate_partial(&self, sets: &[SetScore]) -> Result<(), BracketError> {
        let needed = self.sets_to_win();
        let (mut top, mut bottom) = (0usize, 0usize);
        let Some((last, finished)) = sets.split_last() else {
            return Ok(());
        };

        for &set in finished {
            match self.set_winner(set)? {
                Side::Top => top += 1,
                Side::Bottom => bottom += 1,
            }
            if top == needed || bottom == needed {
                return Err(BracketError::InvalidScore(
                    "match was already decided before it ended early".into(),
                ));
            }
        }

        if let Ok(side) = self.set_winner(*last) {
            let (t, b) = match side {
                Side::Top => (top + 1, bottom),
                Side::Bottom => (top, bottom + 1),
            };
            if t == needed || b == needed {
                return Err(BracketError::InvalidScore(
                    "match was already decided before it ended early".into(),
                ));
            }
        }
        Ok(())
    }
}
