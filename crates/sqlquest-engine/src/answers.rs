use crate::{EngineError, MissionCompletion, ProgressionEngine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlquest_core::{
    compare, experience_for_answer, ExerciseKey, GradeReport, Learner, ProgressRecord,
    ReviewEntry, Row,
};
use tracing::info;

/// How correctness is decided for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    /// Rows from the learner's query and the reference query, compared by the grader.
    Graded { actual: Vec<Row>, expected: Vec<Row> },
    /// Correctness decided upstream, used when the reference query could not run.
    Reported { correct: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSubmission {
    pub exercise: ExerciseKey,
    #[serde(default)]
    pub hints_used: u32,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerReceipt {
    pub correct: bool,
    pub grade: Option<GradeReport>,
    pub xp_awarded: u64,
    pub progress: ProgressRecord,
    pub review: ReviewEntry,
    pub learner: Learner,
    /// Present only for correct answers.
    pub mission: Option<MissionCompletion>,
}

impl ProgressionEngine {
    /// Grades one answer and applies everything it earns in a single commit: the ledger
    /// entry and XP, the review schedule, and on a correct answer today's mission slot.
    pub fn submit_answer(
        &self,
        user_id: &str,
        submission: &AnswerSubmission,
        now: DateTime<Utc>,
    ) -> Result<AnswerReceipt, EngineError> {
        let exercise = submission.exercise;
        if !self.catalog.contains(exercise) {
            return Err(EngineError::UnknownExercise { exercise });
        }

        let grade = match &submission.verdict {
            Verdict::Graded { actual, expected } => Some(compare(actual, expected)?),
            Verdict::Reported { .. } => None,
        };
        let correct = match (&grade, &submission.verdict) {
            (Some(report), _) => report.matches,
            (None, Verdict::Reported { correct }) => *correct,
            (None, Verdict::Graded { .. }) => false,
        };
        let xp_awarded = experience_for_answer(exercise.level_id, submission.hints_used, correct);

        self.serialized(user_id, || {
            let today = now.date_naive();
            let mut txn = self.begin(user_id, now)?;
            let progress = self.upsert_progress_in(
                &mut txn,
                exercise,
                correct,
                xp_awarded,
                submission.hints_used,
                now,
            )?;

            let previous = self.store.review(user_id, exercise)?;
            let review = ReviewEntry::schedule(
                previous.as_ref(),
                user_id,
                exercise,
                correct,
                today,
                self.config.review_max_interval_days,
                now,
            );
            txn.batch.put_review(&review);

            let mission = if correct {
                Some(self.complete_mission_in(&mut txn, today, exercise, now)?)
            } else {
                None
            };

            let learner = self.commit(txn)?;
            info!(
                event = "answer_graded",
                user_id,
                exercise = %exercise,
                correct,
                xp_awarded,
                review_due = %review.due_date,
                mission_advanced = mission.as_ref().map_or(false, |m| m.advanced)
            );
            Ok(AnswerReceipt {
                correct,
                grade,
                xp_awarded,
                progress,
                review,
                learner,
                mission,
            })
        })
    }
}
