//! Progression engine: streaks, shields, recovery tickets, daily missions, weekly quests
//! and the XP ledger, all driven by login and answer events.
//!
//! Every mutating operation runs under a per-user lock, loads what it needs, computes the
//! whole transition in memory and persists it with one [`WriteBatch`].

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sqlquest_core::{ExerciseCatalog, ExerciseKey, GradeError, Learner, ProgressRecord};
use sqlquest_storage::{ProgressionStore, StorageError, WriteBatch};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

mod answers;
mod ledger;
mod locks;
mod missions;
mod quests;
mod recovery;
mod streak;

pub use answers::{AnswerReceipt, AnswerSubmission, Verdict};
pub use ledger::ProgressUpdate;
pub use missions::MissionCompletion;
pub use quests::QuestProgress;
pub use streak::LoginReport;

use locks::UserLocks;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("grading error: {0}")]
    Grade(#[from] GradeError),
    #[error("exercise {exercise} is not in the catalog")]
    UnknownExercise { exercise: ExerciseKey },
    #[error("exercise catalog has no questions to draw missions from")]
    EmptyCatalog,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed seed for mission picks and reward rolls; entropy when unset.
    pub rng_seed: Option<u64>,
    pub review_max_interval_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rng_seed: None,
            review_max_interval_days: 30,
        }
    }
}

pub struct ProgressionEngine {
    store: Arc<dyn ProgressionStore>,
    catalog: Arc<dyn ExerciseCatalog>,
    config: EngineConfig,
    locks: UserLocks,
    rng: Mutex<StdRng>,
}

/// Pending changes for one user: the learner as it will be saved plus queued writes.
pub(crate) struct LearnerTxn {
    pub(crate) learner: Learner,
    persisted: Option<Learner>,
    pub(crate) batch: WriteBatch,
}

impl LearnerTxn {
    pub(crate) fn user_id(&self) -> &str {
        &self.learner.user_id
    }
}

impl ProgressionEngine {
    pub fn new(
        store: Arc<dyn ProgressionStore>,
        catalog: Arc<dyn ExerciseCatalog>,
        config: EngineConfig,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            store,
            catalog,
            config,
            locks: UserLocks::default(),
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn learner(&self, user_id: &str) -> Result<Option<Learner>, EngineError> {
        Ok(self.store.learner(user_id)?)
    }

    pub fn progress_for(&self, user_id: &str) -> Result<Vec<ProgressRecord>, EngineError> {
        Ok(self.store.progress_for_learner(user_id)?)
    }

    fn serialized<T>(
        &self,
        user_id: &str,
        op: impl FnOnce() -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let slot = self.locks.slot(user_id);
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        op()
    }

    fn with_rng<T>(&self, draw: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        draw(&mut *rng)
    }

    fn begin(&self, user_id: &str, now: DateTime<Utc>) -> Result<LearnerTxn, EngineError> {
        let persisted = self.store.learner(user_id)?;
        let learner = persisted
            .clone()
            .unwrap_or_else(|| Learner::new(user_id, now));
        Ok(LearnerTxn {
            learner,
            persisted,
            batch: WriteBatch::new(),
        })
    }

    /// Writes the queued changes, adding the learner only when it actually changed.
    fn commit(&self, txn: LearnerTxn) -> Result<Learner, EngineError> {
        let LearnerTxn {
            learner,
            persisted,
            mut batch,
        } = txn;
        if persisted.as_ref() != Some(&learner) {
            batch.put_learner(&learner);
        }
        self.store.commit(&batch)?;
        Ok(learner)
    }
}
