use serde::{Deserialize, Serialize};
use std::fmt;

pub const BASE_XP: u64 = 10;
pub const HINT_DECAY: f64 = 0.8;
pub const MIN_CORRECT_XP: u64 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Introductory,
    Intermediate,
    Advanced,
}

impl Difficulty {
    /// Levels 1-3 are introductory, 4-6 intermediate, everything above advanced.
    pub fn for_level(level_id: u32) -> Self {
        match level_id {
            0..=3 => Difficulty::Introductory,
            4..=6 => Difficulty::Intermediate,
            _ => Difficulty::Advanced,
        }
    }

    pub fn multiplier(&self) -> u64 {
        match self {
            Difficulty::Introductory => 1,
            Difficulty::Intermediate => 2,
            Difficulty::Advanced => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Introductory => "introductory",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// XP for one answer: `floor(10 * multiplier * 0.8^hints)`, at least 1 when correct,
/// always 0 when incorrect.
pub fn experience_for_answer(level_id: u32, hints_used: u32, correct: bool) -> u64 {
    if !correct {
        return 0;
    }
    let multiplier = Difficulty::for_level(level_id).multiplier();
    let exponent = i32::try_from(hints_used).unwrap_or(i32::MAX);
    let raw = (BASE_XP * multiplier) as f64 * HINT_DECAY.powi(exponent);
    (raw.floor() as u64).max(MIN_CORRECT_XP)
}
