use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod catalog;
pub mod grading;
pub mod progression;
pub mod scoring;

pub use catalog::{ExerciseCatalog, UniformCatalog};
pub use grading::{compare, compare_values, GradeError, GradeReport, Row};
pub use progression::{
    level_for_xp, DailyMission, Learner, LoginTransition, ProgressRecord, QuestReward,
    RecoveryOutcome, RecoveryTicket, ReviewEntry, WeeklyQuest,
};
pub use scoring::{experience_for_answer, Difficulty};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("invalid exercise key {input:?}: expected <level>-<question>")]
    InvalidExerciseKey { input: String },
    #[error("{field} must be >= 1, got 0")]
    ZeroIdentifier { field: &'static str },
}

/// Identifies one exercise in the catalog: a question inside a level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExerciseKey {
    pub level_id: u32,
    pub question_id: u32,
}

impl ExerciseKey {
    pub fn new(level_id: u32, question_id: u32) -> Result<Self, ContractError> {
        if level_id == 0 {
            return Err(ContractError::ZeroIdentifier { field: "level_id" });
        }
        if question_id == 0 {
            return Err(ContractError::ZeroIdentifier {
                field: "question_id",
            });
        }
        Ok(Self {
            level_id,
            question_id,
        })
    }
}

impl fmt::Display for ExerciseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.level_id, self.question_id)
    }
}

impl FromStr for ExerciseKey {
    type Err = ContractError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || ContractError::InvalidExerciseKey {
            input: input.to_string(),
        };
        let (level, question) = input.trim().split_once('-').ok_or_else(invalid)?;
        let level_id = level.trim().parse::<u32>().map_err(|_| invalid())?;
        let question_id = question.trim().parse::<u32>().map_err(|_| invalid())?;
        ExerciseKey::new(level_id, question_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exercise_key_display_and_parse_agree() {
        let key = ExerciseKey::new(3, 14).expect("valid key");
        assert_eq!(key.to_string(), "3-14");
        assert_eq!("3-14".parse::<ExerciseKey>().expect("parse"), key);
        assert_eq!(" 3 - 14 ".parse::<ExerciseKey>().expect("parse"), key);
    }

    #[test]
    fn exercise_key_rejects_malformed_input() {
        assert!(matches!(
            "314".parse::<ExerciseKey>(),
            Err(ContractError::InvalidExerciseKey { .. })
        ));
        assert!(matches!(
            "a-b".parse::<ExerciseKey>(),
            Err(ContractError::InvalidExerciseKey { .. })
        ));
        assert_eq!(
            "0-1".parse::<ExerciseKey>(),
            Err(ContractError::ZeroIdentifier { field: "level_id" })
        );
    }
}
