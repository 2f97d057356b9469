use crate::{EngineError, LearnerTxn, ProgressionEngine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlquest_core::{ExerciseKey, Learner, ProgressRecord};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub progress: ProgressRecord,
    pub learner: Learner,
}

impl ProgressionEngine {
    /// Records one attempt at `exercise` and credits `xp_delta` to the learner when the
    /// attempt completed it.
    ///
    /// The deltas are trusted as given: nothing here re-derives XP from the level or hint
    /// count, and the exercise is not checked against the catalog. Every call counts as a
    /// new attempt, so resubmitting the same answer credits it again. Callers that want
    /// server-computed XP go through [`ProgressionEngine::submit_answer`].
    pub fn upsert_progress(
        &self,
        user_id: &str,
        exercise: ExerciseKey,
        completed: bool,
        xp_delta: u64,
        hints_delta: u32,
        now: DateTime<Utc>,
    ) -> Result<ProgressUpdate, EngineError> {
        self.serialized(user_id, || {
            let mut txn = self.begin(user_id, now)?;
            let progress =
                self.upsert_progress_in(&mut txn, exercise, completed, xp_delta, hints_delta, now)?;
            let learner = self.commit(txn)?;
            Ok(ProgressUpdate { progress, learner })
        })
    }

    pub(crate) fn upsert_progress_in(
        &self,
        txn: &mut LearnerTxn,
        exercise: ExerciseKey,
        completed: bool,
        xp_delta: u64,
        hints_delta: u32,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord, EngineError> {
        let progress = match self.store.progress(txn.user_id(), exercise)? {
            Some(mut record) => {
                record.record_attempt(completed, xp_delta, hints_delta, now);
                record
            }
            None => ProgressRecord::first_attempt(
                txn.user_id(),
                exercise,
                completed,
                xp_delta,
                hints_delta,
                now,
            ),
        };

        if completed && xp_delta > 0 {
            txn.learner.add_xp(xp_delta);
        }
        txn.batch.put_progress(&progress);

        info!(
            event = "progress_recorded",
            user_id = txn.user_id(),
            exercise = %exercise,
            completed,
            attempts = progress.attempts,
            xp_delta,
            total_xp = txn.learner.total_xp,
            level = txn.learner.level
        );
        Ok(progress)
    }
}
