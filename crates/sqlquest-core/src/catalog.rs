use crate::ExerciseKey;
use serde::{Deserialize, Serialize};

/// Shape of the exercise catalog. Level and question ids are 1-based.
pub trait ExerciseCatalog: Send + Sync {
    fn level_count(&self) -> u32;
    fn questions_in_level(&self, level_id: u32) -> u32;

    fn contains(&self, exercise: ExerciseKey) -> bool {
        exercise.level_id >= 1
            && exercise.level_id <= self.level_count()
            && exercise.question_id >= 1
            && exercise.question_id <= self.questions_in_level(exercise.level_id)
    }
}

/// Catalog where every level holds the same number of questions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UniformCatalog {
    pub levels: u32,
    pub questions_per_level: u32,
}

impl Default for UniformCatalog {
    fn default() -> Self {
        Self {
            levels: 10,
            questions_per_level: 10,
        }
    }
}

impl ExerciseCatalog for UniformCatalog {
    fn level_count(&self) -> u32 {
        self.levels
    }

    fn questions_in_level(&self, level_id: u32) -> u32 {
        if level_id == 0 || level_id > self.levels {
            0
        } else {
            self.questions_per_level
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_catalog_bounds() {
        let catalog = UniformCatalog {
            levels: 2,
            questions_per_level: 5,
        };
        assert!(catalog.contains(ExerciseKey {
            level_id: 2,
            question_id: 5
        }));
        assert!(!catalog.contains(ExerciseKey {
            level_id: 3,
            question_id: 1
        }));
        assert!(!catalog.contains(ExerciseKey {
            level_id: 1,
            question_id: 6
        }));
        assert_eq!(catalog.questions_in_level(0), 0);
    }
}
